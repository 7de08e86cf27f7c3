//! Plain-text extraction for uploaded résumé files.
//!
//! Supported: PDF (via `pdf-extract`) and plain text / markdown. Anything else
//! is rejected with 415 before it reaches the quota gate.

use tracing::{debug, warn};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    PlainText,
}

/// Decides how to read an upload from its declared content type, falling back
/// to the file extension when the client sends `application/octet-stream`.
pub fn detect_kind(filename: Option<&str>, content_type: Option<&str>) -> Option<UploadKind> {
    let content_type = content_type
        .map(|c| c.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();

    match content_type.as_str() {
        "application/pdf" => return Some(UploadKind::Pdf),
        ct if ct.starts_with("text/") => return Some(UploadKind::PlainText),
        _ => {}
    }

    let extension = filename
        .and_then(|f| f.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())?;
    match extension.as_str() {
        "pdf" => Some(UploadKind::Pdf),
        "txt" | "md" | "text" => Some(UploadKind::PlainText),
        _ => None,
    }
}

/// Extracts text from an uploaded file. Invalid UTF-8 in text uploads is
/// replaced, not rejected.
pub async fn extract_text(
    filename: Option<&str>,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let kind = detect_kind(filename, content_type).ok_or_else(|| {
        AppError::UnsupportedMedia(format!(
            "Unsupported file type {}; upload a PDF or plain-text file",
            content_type.unwrap_or("unknown")
        ))
    })?;

    debug!("Extracting {:?} upload ({} bytes)", kind, bytes.len());

    match kind {
        UploadKind::PlainText => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        UploadKind::Pdf => {
            let extracted =
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                    .await;

            match extracted {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(e)) => {
                    warn!("PDF extraction failed: {e}");
                    Err(unreadable_pdf())
                }
                // pdf-extract panics on some malformed documents
                Err(e) if e.is_panic() => {
                    warn!("PDF extraction panicked on malformed input");
                    Err(unreadable_pdf())
                }
                Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                    "PDF extraction task failed: {e}"
                ))),
            }
        }
    }
}

fn unreadable_pdf() -> AppError {
    AppError::UnprocessableEntity("Could not read text from the PDF".to_string())
}
