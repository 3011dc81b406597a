//! # edgequake-finmetrics
//!
//! Locate financial metrics in report PDFs and extract them with an LLM.
//!
//! ## Why two phases?
//!
//! Annual reports run to hundreds of pages, and only a handful mention the
//! line items you care about. A cheap text scan finds those pages first;
//! only their text and table rows are cut into small keyword-centred
//! snippets, and only the snippets reach the model. One short call per
//! keyword instead of a whole document per call.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file, URL or byte buffer
//!  ├─ 2. Scan      flag pages mentioning any keyword (pdfium, spawn_blocking)
//!  ├─ 3. Extract   text + table rows of flagged pages only
//!  ├─ 4. Snippets  ±200-char windows and matching rows, global budget of 20
//!  ├─ 5. Resolve   one JSON-only LLM call per keyword, in keyword order
//!  └─ 6. Output    keyword → {metric, value, unit, year} or an error record
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_finmetrics::{analyze, ExtractionConfig, ExtractionOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::builder()
//!         .keywords(["Total Assets", "Net Income"])
//!         .build()?;
//!     match analyze("annual-report.pdf", &config).await? {
//!         ExtractionOutcome::Extracted(report) => println!("{}", report.result.to_json()?),
//!         ExtractionOutcome::NothingFound { .. } => eprintln!("no relevant pages"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `finmetrics` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-finmetrics = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_and_store, analyze_bytes, analyze_sync, inspect, inspect_with_password, locate,
    Evidence, LocatePlan, Located, MetricPipeline,
};
pub use config::{BudgetPolicy, ExtractionConfig, ExtractionConfigBuilder, RetryPolicy};
pub use document::{Document, Page, PageSource, Row, Table};
pub use error::{FinMetricsError, MetricError, PageReadError, ServiceError, ServiceErrorKind};
pub use output::{
    DocumentSummary, ExtractionOutcome, ExtractionReport, ExtractionResult, ExtractionStats,
    MetricFailure, MetricRecord, MetricValue,
};
pub use pipeline::service::{Completion, ExtractionService, LlmExtractionService};
pub use pipeline::snippets::{Snippet, SnippetSource};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{JsonlResultStore, MemoryResultStore, ResultStore, StoredResult};
