//! Text Normalizer: canonicalizes submitted text so that formatting noise does
//! not change a submission's fingerprint.
//!
//! Rules, in order:
//! 1. `\r\n` and lone `\r` become `\n`.
//! 2. Every run of horizontal whitespace (anything `char::is_whitespace` other
//!    than `\n`) becomes a single space; spaces at line edges are dropped.
//! 3. Any run of blank lines becomes exactly one blank line.
//! 4. Leading and trailing whitespace is stripped.
//!
//! `normalize(normalize(x)) == normalize(x)` for every input.

use std::fmt;

use serde::Serialize;

/// Text that has been through [`normalize`]. The only way to build one outside
/// tests is via that function, so holding a `NormalizedText` is proof of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalizes raw text. Absent input yields the empty string; never fails.
pub fn normalize(raw: Option<&str>) -> NormalizedText {
    let raw = match raw {
        Some(r) => r,
        None => return NormalizedText(String::new()),
    };

    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = false;

    for line in unified.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let blank = collapsed.is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        lines.push(collapsed);
    }

    NormalizedText(lines.join("\n").trim().to_string())
}
