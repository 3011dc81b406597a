//! Pipeline stages for financial-metric extraction.
//!
//! Each submodule implements one step. The locate phase is pure and
//! synchronous; only the resolve phase touches the network.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────── locate ─────────────┐   ┌──── resolve ────┐
//! input ──▶ scan ──▶ extract ──▶ snippets ──▶ resolve ──▶ response
//! (path/URL) (pages)  (text+rows)  (windows)     (service)   (JSON)
//! ```
//!
//! 1. [`input`]    canonicalise the path, URL or buffer to a local file
//! 2. [`pdf`]      open it with pdfium on a blocking thread; [`tables`]
//!    recovers table rows from positioned text
//! 3. [`scan`]     flag pages that mention any keyword
//! 4. [`extract`]  text and flattened table rows of flagged pages only
//! 5. [`snippets`] keyword-centred windows, capped at `max_snippets`
//! 6. [`resolve`]  one service call per keyword, with opt-in retry
//! 7. [`response`] parse the reply into a metric or an error record
//!
//! [`service`] is the seam between the pipeline and the model.

pub mod extract;
pub mod input;
pub mod pdf;
pub mod resolve;
pub mod response;
pub mod scan;
pub mod service;
pub mod snippets;
pub mod tables;
