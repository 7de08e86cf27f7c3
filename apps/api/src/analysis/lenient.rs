//! Lenient parsing of provider output.
//!
//! First a strict parse (after stripping code fences). If that fails, the first
//! balanced `{...}` block in the content is parsed instead. Only JSON objects
//! count as candidates.

use serde_json::Value;

use crate::llm_client::strip_json_fences;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Extracted,
}

/// Returns the candidate object and how it was obtained, or `None` when the
/// content holds no parseable object.
pub fn parse_candidate(content: &str) -> Option<(Value, ParseMode)> {
    if let Some(value) = parse_object(strip_json_fences(content)) {
        return Some((value, ParseMode::Strict));
    }

    first_balanced_object(content)
        .and_then(parse_object)
        .map(|value| (value, ParseMode::Extracted))
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Slice from the first `{` to its matching `}`. Braces inside JSON string
/// literals are ignored so `"a}b"` does not end the block early.
fn first_balanced_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&content[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_object() {
        let (value, mode) = parse_candidate(r#"{"industry": "IT"}"#).unwrap();
        assert_eq!(mode, ParseMode::Strict);
        assert_eq!(value["industry"], "IT");
    }

    #[test]
    fn test_fenced_object_is_strict() {
        let (_, mode) = parse_candidate("```json\n{\"score\": 7}\n```").unwrap();
        assert_eq!(mode, ParseMode::Strict);
    }

    #[test]
    fn test_object_wrapped_in_prose_is_extracted() {
        let content = "Claro, aquí tienes el análisis:\n{\"industry\": \"Salud\", \"skills\": [\"triage\"]}\nSaludos.";
        let (value, mode) = parse_candidate(content).unwrap();
        assert_eq!(mode, ParseMode::Extracted);
        assert_eq!(value["industry"], "Salud");
    }

    #[test]
    fn test_nested_and_string_braces_are_balanced() {
        let content = r#"prefix {"summary": "usa {llaves} y \"comillas\"", "meta": {"a": {"b": 1}}} trailing }"#;
        let (value, mode) = parse_candidate(content).unwrap();
        assert_eq!(mode, ParseMode::Extracted);
        assert_eq!(value["meta"]["a"]["b"], 1);
        assert_eq!(value["summary"], "usa {llaves} y \"comillas\"");
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        assert!(parse_candidate("[1, 2, 3]").is_none());
        assert!(parse_candidate("\"just a string\"").is_none());
        assert!(parse_candidate("42").is_none());
    }

    #[test]
    fn test_truncated_output_is_rejected() {
        assert!(parse_candidate(r#"{"industry": "IT", "skills": ["rust""#).is_none());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_candidate("<html>502 Bad Gateway</html>").is_none());
        assert!(parse_candidate("").is_none());
        assert!(parse_candidate("} {").is_none());
    }

    #[test]
    fn test_first_block_only() {
        // the first balanced block is not valid JSON; later blocks are not tried
        assert!(parse_candidate(r#"{not json} {"industry": "IT"}"#).is_none());
    }
}
