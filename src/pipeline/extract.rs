//! Targeted pass: pull text (and optionally tables) from flagged pages only.

use crate::document::PageSource;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Where a page's text sits inside [`ExtractedContent::text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub page: usize,
    /// Byte range of the page text (separator excluded).
    pub range: Range<usize>,
}

/// A flattened table row with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRowText {
    pub page: usize,
    pub table: usize,
    pub row: usize,
    pub text: String,
}

/// Output of the extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Page texts in ascending page order, newline separated.
    pub text: String,
    /// One span per page that contributed text, in the same order.
    pub pages: Vec<PageSpan>,
    /// Flattened rows, page → table → row order. Empty when tables are off.
    pub table_rows: Vec<TableRowText>,
}

impl ExtractedContent {
    /// The page whose text contains byte offset `offset`. Separators and
    /// empty pages map to `None`.
    pub fn page_at(&self, offset: usize) -> Option<usize> {
        self.pages
            .iter()
            .find(|s| s.range.contains(&offset))
            .map(|s| s.page)
    }

    /// Indices of the pages that were actually read.
    pub fn page_indices(&self) -> Vec<usize> {
        self.pages.iter().map(|s| s.page).collect()
    }
}

/// Extract content from `page_indices`.
///
/// Indices are processed in ascending order and deduplicated; any index
/// `>= page_count` is skipped without an error or placeholder. Unreadable
/// page text or tables degrade to nothing with a warning.
pub fn extract_pages<S: PageSource + ?Sized>(
    source: &S,
    page_indices: &[usize],
    include_tables: bool,
) -> ExtractedContent {
    let total = source.page_count();
    let mut indices = page_indices.to_vec();
    indices.sort_unstable();
    indices.dedup();

    let mut content = ExtractedContent::default();

    for idx in indices {
        if idx >= total {
            warn!("Skipping page {} (out of range, total={})", idx, total);
            continue;
        }

        let text = source.page_text(idx).unwrap_or_else(|e| {
            warn!("Extract: {}", e);
            String::new()
        });
        if !content.pages.is_empty() {
            content.text.push('\n');
        }
        let start = content.text.len();
        content.text.push_str(&text);
        content.pages.push(PageSpan {
            page: idx,
            range: start..content.text.len(),
        });

        if include_tables {
            let tables = source.page_tables(idx).unwrap_or_else(|e| {
                warn!("Extract tables: {}", e);
                Vec::new()
            });
            for (t, table) in tables.iter().enumerate() {
                for (r, row) in table.rows.iter().enumerate() {
                    content.table_rows.push(TableRowText {
                        page: idx,
                        table: t,
                        row: r,
                        text: row.flatten(),
                    });
                }
            }
            debug!("Page {}: {} tables", idx, tables.len());
        }
    }

    info!(
        "Extracted {} pages: {} chars, {} table rows",
        content.pages.len(),
        content.text.chars().count(),
        content.table_rows.len()
    );
    content
}
