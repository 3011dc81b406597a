//! Prompts for the per-keyword extraction call.
//!
//! Every prompt lives here so unit tests can inspect them without a model.
//! Callers can override the system instruction via
//! [`crate::config::ExtractionConfig::system_prompt`]; the user prompt shape
//! is fixed because the reply parser depends on it.

/// Separator placed between snippets in the user prompt.
pub const SNIPPET_SEPARATOR: &str = "\n---\n";

/// Default system instruction for the extraction service.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a financial data extraction assistant. \
You read excerpts from company financial reports and extract exactly one requested metric. \
Reply with a single JSON object and nothing else: no prose, no markdown fences.";

/// Build the user prompt for `keyword` from its snippets.
///
/// With no snippets the prompt still asks the question, so the model can
/// answer with a `null` value instead of guessing.
pub fn metric_prompt(keyword: &str, snippets: &[&str]) -> String {
    let context = if snippets.is_empty() {
        "(no excerpts mention this metric)".to_string()
    } else {
        snippets.join(SNIPPET_SEPARATOR)
    };

    format!(
        "Extract the value of \"{keyword}\" from the financial report excerpts below.\n\
\n\
Return strictly JSON with exactly these four fields:\n\
- \"metric\": the metric name, \"{keyword}\"\n\
- \"value\": the figure as written in the report (string), or null if absent\n\
- \"unit\": the unit or scale, e.g. \"million\", \"USD thousands\", \"%\" (string or null)\n\
- \"year\": the fiscal year the figure refers to (number or null)\n\
\n\
If several years are present, use the most recent one.\n\
\n\
Excerpts:\n\
{context}"
    )
}
