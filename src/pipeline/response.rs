//! Reply parsing: turn the service's raw text into a [`MetricValue`].
//!
//! The service promises nothing about its output. A few deterministic
//! cleanup rules run before JSON parsing (models wrap JSON in fences despite
//! the prompt); anything that still is not a JSON object with a `value`
//! field is a malformed reply.
//!
//! Rules (applied in order):
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip outer code fences (```` ```json … ``` ````)
//! 3. Trim surrounding whitespace

use crate::error::MetricError;
use crate::output::MetricValue;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse a service reply for `keyword`.
///
/// The returned error carries the verbatim `raw` text, never the cleaned one.
pub fn parse_metric_reply(keyword: &str, raw: &str) -> Result<MetricValue, MetricError> {
    let cleaned = clean_reply(raw);
    let malformed = |reason: String| MetricError::MalformedResponse {
        keyword: keyword.to_string(),
        reason,
        raw: raw.to_string(),
    };

    let parsed: Value = serde_json::from_str(&cleaned).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(mut obj) = parsed else {
        return Err(malformed("expected a JSON object".into()));
    };
    let Some(value) = obj.remove("value") else {
        return Err(malformed("missing `value` field".into()));
    };

    let metric = match obj.remove("metric") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => keyword.to_string(),
    };

    Ok(MetricValue {
        metric,
        value,
        unit: obj.remove("unit").unwrap_or(Value::Null),
        year: obj.remove("year").unwrap_or(Value::Null),
    })
}

/// Apply the cleanup rules to a raw reply.
pub fn clean_reply(raw: &str) -> String {
    let s = remove_invisible_chars(raw);
    let s = strip_code_fences(&s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

// ── Rule 2: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").expect("fence regex is valid")
});

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}
