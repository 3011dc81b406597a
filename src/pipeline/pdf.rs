//! pdfium backend for [`PageSource`].
//!
//! pdfium wraps a C++ library with thread-local state, so a
//! [`PdfPageSource`] is neither `Send` nor usable from async code. All work
//! against an open document goes through [`with_pdf`], which opens the file
//! on a `spawn_blocking` thread and runs the caller's closure there.
//!
//! ## Library binding
//!
//! [`bind_pdfium`] looks for the pdfium shared library in this order:
//!
//! 1. `PDFIUM_LIB_PATH` (a library file or the directory containing it)
//! 2. the current working directory
//! 3. the system library search path

use crate::document::{PageSource, Table};
use crate::error::{FinMetricsError, PageReadError};
use crate::pipeline::tables::{detect_tables, TableDetectorConfig, TextSpan};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind to a pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, FinMetricsError> {
    if let Ok(custom) = std::env::var("PDFIUM_LIB_PATH") {
        if !custom.is_empty() {
            let path = PathBuf::from(&custom);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
            return Pdfium::bind_to_library(&lib)
                .map(Pdfium::new)
                .map_err(|e| FinMetricsError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)));
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| FinMetricsError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load failure to the matching open error.
fn open_error(path: &Path, password: Option<&str>, e: PdfiumError) -> FinMetricsError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            FinMetricsError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            FinMetricsError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        FinMetricsError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

/// An open PDF read through pdfium.
pub struct PdfPageSource<'a> {
    document: PdfDocument<'a>,
    page_count: usize,
    table_config: TableDetectorConfig,
}

impl<'a> PdfPageSource<'a> {
    pub fn open(pdfium: &'a Pdfium, path: &Path, password: Option<&'a str>) -> Result<Self, FinMetricsError> {
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| open_error(path, password, e))?;
        let page_count = document.pages().len() as usize;
        info!("PDF loaded: {} pages", page_count);
        Ok(Self {
            document,
            page_count,
            table_config: TableDetectorConfig::default(),
        })
    }

    pub fn with_table_config(mut self, config: TableDetectorConfig) -> Self {
        self.table_config = config;
        self
    }

    fn page(&self, index: usize) -> Result<PdfPage<'a>, PageReadError> {
        if index >= self.page_count {
            return Err(PageReadError {
                index,
                detail: format!("out of range (total={})", self.page_count),
            });
        }
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| read_error(index, e))
    }
}

fn read_error(index: usize, e: PdfiumError) -> PageReadError {
    PageReadError {
        index,
        detail: format!("{:?}", e),
    }
}

impl PageSource for PdfPageSource<'_> {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&self, index: usize) -> Result<String, PageReadError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| read_error(index, e))?;
        Ok(text.all())
    }

    fn page_tables(&self, index: usize) -> Result<Vec<Table>, PageReadError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| read_error(index, e))?;
        let spans: Vec<TextSpan> = text
            .segments()
            .iter()
            .map(|segment| {
                let bounds = segment.bounds();
                TextSpan {
                    text: segment.text(),
                    left: bounds.left().value,
                    right: bounds.right().value,
                    top: bounds.top().value,
                    bottom: bounds.bottom().value,
                }
            })
            .collect();
        let tables = detect_tables(&spans, &self.table_config);
        debug!("Page {}: {} segments, {} tables", index + 1, spans.len(), tables.len());
        Ok(tables)
    }
}

/// Open `path` on a blocking thread and run `f` against it.
pub async fn with_pdf<F, R>(path: &Path, password: Option<&str>, f: F) -> Result<R, FinMetricsError>
where
    F: FnOnce(&PdfPageSource<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    let path = path.to_path_buf();
    let password = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || -> Result<R, FinMetricsError> {
        let pdfium = bind_pdfium()?;
        let source = PdfPageSource::open(&pdfium, &path, password.as_deref())?;
        Ok(f(&source))
    })
    .await
    .map_err(|e| FinMetricsError::Internal(format!("PDF task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_errors_are_classified() {
        let path = Path::new("locked.pdf");
        let e = open_error(path, None, PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError));
        assert!(matches!(e, FinMetricsError::PasswordRequired { .. }));
        let e = open_error(
            path,
            Some("guess"),
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError),
        );
        assert!(matches!(e, FinMetricsError::WrongPassword { .. }));
    }

    #[test]
    fn other_load_errors_are_corrupt() {
        let e = open_error(
            Path::new("bad.pdf"),
            None,
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError),
        );
        assert!(matches!(e, FinMetricsError::CorruptPdf { .. }));
        assert!(e.is_open_error());
    }
}
