//! Result types returned by the extraction pipeline.

use crate::pipeline::snippets::Snippet;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Error marker for replies that are not a JSON metric object.
pub const MALFORMED_RESPONSE_MARKER: &str = "invalid JSON response";

/// Error marker for service calls that failed outright.
pub const SERVICE_FAILURE_MARKER: &str = "extraction service call failed";

/// Error marker for keywords skipped because no snippet mentioned them.
pub const NO_EVIDENCE_MARKER: &str = "no evidence found";

/// A metric as returned by the extraction service.
///
/// `value` and `year` stay as raw JSON: models answer `"1,234"`, `1234`,
/// `"FY2023"` or `2023` for the same figure, and normalising them is the
/// caller's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub metric: String,
    pub value: serde_json::Value,
    pub unit: serde_json::Value,
    pub year: serde_json::Value,
}

/// A captured per-keyword failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFailure {
    /// One of the `*_MARKER` constants.
    pub error: String,
    /// Verbatim service reply; empty when no reply was received.
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The outcome for one keyword: a value or a captured error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricRecord {
    Failed(MetricFailure),
    Extracted(MetricValue),
}

impl MetricRecord {
    pub fn malformed(raw: impl Into<String>) -> Self {
        MetricRecord::Failed(MetricFailure {
            error: MALFORMED_RESPONSE_MARKER.to_string(),
            raw: raw.into(),
            detail: None,
        })
    }

    pub fn service_failure(detail: impl Into<String>) -> Self {
        MetricRecord::Failed(MetricFailure {
            error: SERVICE_FAILURE_MARKER.to_string(),
            raw: String::new(),
            detail: Some(detail.into()),
        })
    }

    pub fn no_evidence() -> Self {
        MetricRecord::Failed(MetricFailure {
            error: NO_EVIDENCE_MARKER.to_string(),
            raw: String::new(),
            detail: None,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MetricRecord::Failed(_))
    }

    pub fn value(&self) -> Option<&MetricValue> {
        match self {
            MetricRecord::Extracted(v) => Some(v),
            MetricRecord::Failed(_) => None,
        }
    }
}

/// Keyword → record mapping for one document, in keyword order.
///
/// Serialises as a JSON object whose keys follow the configured keyword order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    entries: Vec<(String, MetricRecord)>,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `keyword`, keeping its first position.
    pub fn insert(&mut self, keyword: impl Into<String>, record: MetricRecord) {
        let keyword = keyword.into();
        match self.entries.iter_mut().find(|(k, _)| *k == keyword) {
            Some(slot) => slot.1 = record,
            None => self.entries.push((keyword, record)),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&MetricRecord> {
        self.entries
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricRecord)> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|(_, r)| !r.is_error()).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, r) in &self.entries {
            map.serialize_entry(k, r)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExtractionResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResultVisitor;

        impl<'de> Visitor<'de> for ResultVisitor {
            type Value = ExtractionResult;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of keyword to metric record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut result = ExtractionResult::new();
                while let Some((k, r)) = access.next_entry::<String, MetricRecord>()? {
                    result.insert(k, r);
                }
                Ok(result)
            }
        }

        deserializer.deserialize_map(ResultVisitor)
    }
}

/// Timing and volume counters for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub flagged_pages: usize,
    pub snippet_count: usize,
    pub service_calls: usize,
    pub failed_keywords: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub locate_duration_ms: u64,
    pub resolve_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A completed run over a document in which at least one page matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Path, URL or caller-chosen name of the document.
    pub source: String,
    pub result: ExtractionResult,
    /// Pages flagged by the scan (0-based).
    pub flagged_pages: Vec<usize>,
    /// Evidence sent to the service.
    pub snippets: Vec<Snippet>,
    pub stats: ExtractionStats,
}

/// What a run produced.
///
/// `NothingFound` is a normal outcome, not an error: the scan found no page
/// mentioning any keyword, so no content was extracted and no service call
/// was made.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    NothingFound { source: String, total_pages: usize },
    Extracted(ExtractionReport),
}

impl ExtractionOutcome {
    pub fn report(&self) -> Option<&ExtractionReport> {
        match self {
            ExtractionOutcome::Extracted(r) => Some(r),
            ExtractionOutcome::NothingFound { .. } => None,
        }
    }

    pub fn is_nothing_found(&self) -> bool {
        matches!(self, ExtractionOutcome::NothingFound { .. })
    }
}

/// Quick look at a document without any model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source: String,
    pub page_count: usize,
    /// First [`crate::analyze::PREVIEW_CHARS`] characters of the document text.
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_record() -> MetricRecord {
        MetricRecord::Extracted(MetricValue {
            metric: "Total Assets".into(),
            value: json!("1234"),
            unit: json!("million"),
            year: json!(2023),
        })
    }

    #[test]
    fn extracted_record_serialises_to_plain_object() {
        assert_eq!(
            serde_json::to_value(value_record()).unwrap(),
            json!({"metric": "Total Assets", "value": "1234", "unit": "million", "year": 2023})
        );
    }

    #[test]
    fn malformed_record_shape() {
        assert_eq!(
            serde_json::to_value(MetricRecord::malformed("not json")).unwrap(),
            json!({"error": MALFORMED_RESPONSE_MARKER, "raw": "not json"})
        );
    }

    #[test]
    fn records_deserialise_to_the_right_variant() {
        let ok: MetricRecord = serde_json::from_value(
            json!({"metric": "Revenue", "value": 5, "unit": null, "year": "FY23"}),
        )
        .unwrap();
        assert!(!ok.is_error());
        let failed: MetricRecord =
            serde_json::from_value(json!({"error": "x", "raw": "y"})).unwrap();
        assert!(failed.is_error());
    }

    #[test]
    fn result_serialises_in_keyword_order() {
        let mut r = ExtractionResult::new();
        r.insert("Total Assets", value_record());
        r.insert("Net Income", MetricRecord::malformed("oops"));
        r.insert("Equity", MetricRecord::no_evidence());
        let s = r.to_json().unwrap();
        let a = s.find("Total Assets").unwrap();
        let b = s.find("Net Income").unwrap();
        let c = s.find("Equity").unwrap();
        assert!(a < b && b < c, "got: {s}");

        let back: ExtractionResult = serde_json::from_str(&s).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.keywords().collect::<Vec<_>>(), vec!["Total Assets", "Net Income", "Equity"]);
    }

    #[test]
    fn insert_replaces_without_duplicating() {
        let mut r = ExtractionResult::new();
        r.insert("Revenue", MetricRecord::malformed("a"));
        r.insert("Revenue", value_record());
        assert_eq!(r.len(), 1);
        assert_eq!(r.success_count(), 1);
    }
}
