//! Response Shaper: the single point where untrusted shape is eliminated.
//!
//! `shape` is total over any JSON value. Field rules:
//! - strings: kept if already a string, else a fixed default
//! - string arrays: kept only if an array; elements stringified, empties
//!   dropped, `skills` deduplicated case-insensitively, then truncated
//! - `score`: kept if a number, clamped to [1, 10], else 5

use std::collections::HashSet;

use serde_json::Value;

use crate::analysis::models::AnalysisResult;

pub const DEFAULT_INDUSTRY: &str = "General";
pub const DEFAULT_SENIORITY: &str = "No determinado";
pub const DEFAULT_SCORE: f64 = 5.0;

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

pub const MAX_TOP_ROLES: usize = 5;
pub const MAX_SKILLS: usize = 30;
pub const MAX_RED_FLAGS: usize = 8;
pub const MAX_NEXT_STEPS: usize = 6;

/// Coerces an arbitrary candidate into a schema-valid `AnalysisResult`.
pub fn shape(candidate: &Value) -> AnalysisResult {
    AnalysisResult {
        industry: string_field(candidate, "industry", DEFAULT_INDUSTRY),
        role_seniority: string_field(candidate, "role_seniority", DEFAULT_SENIORITY),
        top_roles: string_list(candidate, "top_roles", MAX_TOP_ROLES, false),
        skills: string_list(candidate, "skills", MAX_SKILLS, true),
        score: score_field(candidate),
        red_flags: string_list(candidate, "red_flags", MAX_RED_FLAGS, false),
        summary: string_field(candidate, "summary", ""),
        next_steps: string_list(candidate, "next_steps", MAX_NEXT_STEPS, false),
    }
}

fn string_field(candidate: &Value, key: &str, default: &str) -> String {
    match candidate.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

fn string_list(candidate: &Value, key: &str, max: usize, dedup: bool) -> Vec<String> {
    let Some(Value::Array(items)) = candidate.get(key) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(stringify)
        .filter(|s| !s.is_empty())
        .filter(|s| !dedup || seen.insert(s.to_lowercase()))
        .take(max)
        .collect()
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn score_field(candidate: &Value) -> f64 {
    candidate
        .get("score")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(MIN_SCORE, MAX_SCORE))
        .unwrap_or(DEFAULT_SCORE)
}
