//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline scans the document and resolves each keyword.
//! Keywords are resolved one at a time, so events arrive in keyword order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_finmetrics::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_keyword_complete(&self, keyword: &str, index: usize, total: usize) {
//!         eprintln!("{}/{} {keyword} done", index + 1, total);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` so a config
/// can be shared across tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the fast scan has finished.
    ///
    /// # Arguments
    /// * `flagged_pages`: pages containing at least one keyword
    /// * `total_pages`: pages in the document
    fn on_scan_complete(&self, flagged_pages: usize, total_pages: usize) {
        let _ = (flagged_pages, total_pages);
    }

    /// Called after snippet assembly, before the first service call.
    fn on_snippets_ready(&self, snippet_count: usize) {
        let _ = snippet_count;
    }

    /// Called just before the service is asked about a keyword.
    ///
    /// `index` is 0-based within the keyword list.
    fn on_keyword_start(&self, keyword: &str, index: usize, total: usize) {
        let _ = (keyword, index, total);
    }

    /// Called when a keyword resolved to a metric value.
    fn on_keyword_complete(&self, keyword: &str, index: usize, total: usize) {
        let _ = (keyword, index, total);
    }

    /// Called when a keyword resolved to an error record.
    fn on_keyword_error(&self, keyword: &str, index: usize, total: usize, error: &str) {
        let _ = (keyword, index, total, error);
    }

    /// Called once after every keyword has a record.
    fn on_extraction_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
