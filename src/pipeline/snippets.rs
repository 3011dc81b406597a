//! Snippet assembly: bounded evidence per keyword.
//!
//! For each keyword, every case-insensitive occurrence in the extracted text
//! yields a context window of `window_radius` characters either side of the
//! match, followed by every table row mentioning the keyword. The total
//! across all keywords never exceeds `max_snippets`.
//!
//! Windows are measured in characters, not bytes, and always start and end
//! on UTF-8 boundaries, so annual reports with `€`, `£` or non-breaking
//! spaces never cause a slicing panic.

use crate::config::{BudgetPolicy, ExtractionConfig};
use crate::pipeline::extract::ExtractedContent;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where a snippet came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnippetSource {
    /// A context window around a text match.
    Text {
        page: Option<usize>,
        /// Byte offset of the match in the extracted text.
        offset: usize,
    },
    /// A flattened table row.
    Table { page: usize, table: usize, row: usize },
}

/// One piece of evidence for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub keyword: String,
    pub text: String,
    pub source: SnippetSource,
}

/// Builds the bounded snippet list for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnippetAssembler {
    pub window_radius: usize,
    pub max_snippets: usize,
    pub policy: BudgetPolicy,
}

impl SnippetAssembler {
    pub fn new(window_radius: usize, max_snippets: usize, policy: BudgetPolicy) -> Self {
        Self {
            window_radius,
            max_snippets,
            policy,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.window_radius, config.max_snippets, config.budget_policy)
    }

    /// Assemble snippets in keyword order, then occurrence order, then row order.
    pub fn assemble(&self, content: &ExtractedContent, keywords: &[String]) -> Vec<Snippet> {
        let snippets = match self.policy {
            BudgetPolicy::KeywordPriority => self.assemble_priority(content, keywords),
            BudgetPolicy::FairShare => self.assemble_fair(content, keywords),
        };
        debug!(
            "Assembled {} snippets (budget {}, {:?})",
            snippets.len(),
            self.max_snippets,
            self.policy
        );
        snippets
    }

    fn assemble_priority(&self, content: &ExtractedContent, keywords: &[String]) -> Vec<Snippet> {
        let mut out = Vec::new();
        for keyword in keywords {
            if out.len() >= self.max_snippets {
                debug!("Snippet budget exhausted before '{}'", keyword);
                break;
            }
            out.extend(keyword_evidence(content, keyword, self.window_radius));
            if out.len() >= self.max_snippets {
                out.truncate(self.max_snippets);
                break;
            }
        }
        out
    }

    fn assemble_fair(&self, content: &ExtractedContent, keywords: &[String]) -> Vec<Snippet> {
        let evidence: Vec<Vec<Snippet>> = keywords
            .iter()
            .map(|k| keyword_evidence(content, k, self.window_radius))
            .collect();

        let mut shares = vec![0usize; evidence.len()];
        let mut remaining = self.max_snippets;
        let mut round = 0;
        while remaining > 0 {
            let mut granted = false;
            for (i, ev) in evidence.iter().enumerate() {
                if remaining == 0 {
                    break;
                }
                if ev.len() > round {
                    shares[i] += 1;
                    remaining -= 1;
                    granted = true;
                }
            }
            if !granted {
                break;
            }
            round += 1;
        }

        evidence
            .into_iter()
            .zip(shares)
            .flat_map(|(ev, n)| ev.into_iter().take(n))
            .collect()
    }
}

/// Snippet texts belonging to `keyword`, in assembly order.
pub fn snippets_for<'a>(snippets: &'a [Snippet], keyword: &str) -> Vec<&'a str> {
    snippets
        .iter()
        .filter(|s| s.keyword == keyword)
        .map(|s| s.text.as_str())
        .collect()
}

/// All windows and matching rows for one keyword, unbounded.
fn keyword_evidence(content: &ExtractedContent, keyword: &str, radius: usize) -> Vec<Snippet> {
    let re = match RegexBuilder::new(&regex::escape(keyword))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re,
        Err(e) => {
            warn!("Keyword '{}' cannot be matched: {}", keyword, e);
            return Vec::new();
        }
    };

    let mut out: Vec<Snippet> = re
        .find_iter(&content.text)
        .map(|m| Snippet {
            keyword: keyword.to_string(),
            text: context_window(&content.text, m.start(), m.end(), radius).to_string(),
            source: SnippetSource::Text {
                page: content.page_at(m.start()),
                offset: m.start(),
            },
        })
        .collect();

    let needle = keyword.to_lowercase();
    out.extend(
        content
            .table_rows
            .iter()
            .filter(|r| r.text.to_lowercase().contains(&needle))
            .map(|r| Snippet {
                keyword: keyword.to_string(),
                text: r.text.clone(),
                source: SnippetSource::Table {
                    page: r.page,
                    table: r.table,
                    row: r.row,
                },
            }),
    );
    out
}

/// `text[start..end]` widened by `radius` characters each side, clamped to the text.
///
/// `start` and `end` must be char boundaries.
pub fn context_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let lo = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let hi = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[lo..hi]
}
