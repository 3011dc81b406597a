//! Document model shared by every pipeline stage.
//!
//! The pipeline never talks to pdfium directly. It reads pages through the
//! [`PageSource`] trait, which the pdfium backend
//! ([`crate::pipeline::pdf::PdfPageSource`]) and the in-memory [`Document`]
//! both implement. Tests and callers with their own parsers build a
//! [`Document`] and run exactly the same scan / extract / assemble code.

use crate::error::PageReadError;
use serde::{Deserialize, Serialize};

/// Delimiter placed between cells when a table row is flattened.
pub const CELL_DELIMITER: &str = " | ";

/// A cell is text or absent. Absent cells flatten to an empty string.
pub type Cell = Option<String>;

/// One table row: an ordered sequence of cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Row built from present cells only.
    pub fn from_texts<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(|c| Some(c.into())).collect(),
        }
    }

    /// Join cells with [`CELL_DELIMITER`]; absent cells become empty strings.
    pub fn flatten(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(CELL_DELIMITER)
    }
}

/// An ordered sequence of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

/// A page with its 0-based index, raw text and tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub text: String,
    pub tables: Vec<Table>,
}

/// Page-indexed access to an opened document.
///
/// Implementations must keep page indices stable for the lifetime of the
/// value, so the scan and the extraction pass agree on what index `i` means.
pub trait PageSource {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Plain text of page `index`. May be empty.
    fn page_text(&self, index: usize) -> Result<String, PageReadError>;

    /// Tables recovered from page `index`, in reading order.
    fn page_tables(&self, index: usize) -> Result<Vec<Table>, PageReadError>;
}

/// A fully materialised document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Path, URL or caller-chosen name.
    pub source: String,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a text-only document; page indices follow slice order.
    pub fn from_page_texts<I, S>(source: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Page {
                index,
                text: text.into(),
                tables: Vec::new(),
            })
            .collect();
        Self {
            source: source.into(),
            pages,
        }
    }

    /// Attach tables to page `index`. Ignored if the page does not exist.
    pub fn with_tables(mut self, index: usize, tables: Vec<Table>) -> Self {
        if let Some(page) = self.pages.get_mut(index) {
            page.tables = tables;
        }
        self
    }

    fn page(&self, index: usize) -> Result<&Page, PageReadError> {
        self.pages.get(index).ok_or_else(|| PageReadError {
            index,
            detail: format!("out of range (document has {} pages)", self.pages.len()),
        })
    }
}

impl PageSource for Document {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, PageReadError> {
        self.page(index).map(|p| p.text.clone())
    }

    fn page_tables(&self, index: usize) -> Result<Vec<Table>, PageReadError> {
        self.page(index).map(|p| p.tables.clone())
    }
}
