//! Document-level entry points.
//!
//! A run has two phases:
//!
//! * **locate**: scan every page, extract flagged pages, assemble snippets.
//!   Synchronous and model-free; for PDFs it runs on one blocking thread.
//! * **resolve**: one service call per keyword, in keyword order, one at a
//!   time.
//!
//! If the scan flags nothing, the run stops after locate with
//! [`ExtractionOutcome::NothingFound`] and the service is never called.

use crate::config::ExtractionConfig;
use crate::document::PageSource;
use crate::error::FinMetricsError;
use crate::output::{
    DocumentSummary, ExtractionOutcome, ExtractionReport, ExtractionResult, ExtractionStats,
    MetricRecord,
};
use crate::pipeline::extract::{extract_pages, ExtractedContent};
use crate::pipeline::input;
use crate::pipeline::pdf::with_pdf;
use crate::pipeline::resolve::MetricResolver;
use crate::pipeline::scan::scan_pages;
use crate::pipeline::service::{ExtractionService, LlmExtractionService};
use crate::pipeline::snippets::{snippets_for, Snippet, SnippetAssembler};
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use crate::store::{ResultStore, StoredResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters of document text returned by [`inspect`].
pub const PREVIEW_CHARS: usize = 500;

/// Result of the locate phase when at least one page matched.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub total_pages: usize,
    pub flagged_pages: Vec<usize>,
    pub content: ExtractedContent,
    pub snippets: Vec<Snippet>,
    pub duration_ms: u64,
}

/// Outcome of the locate phase.
#[derive(Debug, Clone)]
pub enum Located {
    NothingFound { total_pages: usize },
    Found(Evidence),
}

/// Everything the locate phase needs. Cheap to clone and `Send`, so it can
/// move onto a blocking thread without the rest of the config.
#[derive(Debug, Clone)]
pub struct LocatePlan {
    pub keywords: Vec<String>,
    pub include_tables: bool,
    pub assembler: SnippetAssembler,
}

impl LocatePlan {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            keywords: config.keywords.clone(),
            include_tables: config.include_tables,
            assembler: SnippetAssembler::from_config(config),
        }
    }

    /// Scan, extract flagged pages and assemble snippets.
    pub fn locate<S: PageSource + ?Sized>(&self, source: &S) -> Located {
        let start = Instant::now();
        let total_pages = source.page_count();

        let flagged_pages = scan_pages(source, &self.keywords);
        if flagged_pages.is_empty() {
            return Located::NothingFound { total_pages };
        }

        let content = extract_pages(source, &flagged_pages, self.include_tables);
        let snippets = self.assembler.assemble(&content, &self.keywords);

        Located::Found(Evidence {
            total_pages,
            flagged_pages,
            content,
            snippets,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// A configured two-phase pipeline bound to an extraction service.
///
/// # Example
/// ```rust,no_run
/// use edgequake_finmetrics::{Document, ExtractionConfig, MetricPipeline};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().keywords(["Total Assets"]).build()?;
/// let pipeline = MetricPipeline::from_config(config)?;
/// let doc = Document::from_page_texts("report", ["Balance sheet", "Total Assets 1,234"]);
/// let outcome = pipeline.run("report", &doc).await;
/// println!("{}", serde_json::to_string_pretty(&outcome)?);
/// # Ok(())
/// # }
/// ```
pub struct MetricPipeline {
    config: ExtractionConfig,
    plan: LocatePlan,
    resolver: MetricResolver,
}

impl MetricPipeline {
    pub fn new(config: ExtractionConfig, service: Arc<dyn ExtractionService>) -> Self {
        let plan = LocatePlan::from_config(&config);
        let resolver = MetricResolver::from_config(service, &config);
        Self {
            config,
            plan,
            resolver,
        }
    }

    /// Build the pipeline with an LLM provider resolved from `config`.
    pub fn from_config(config: ExtractionConfig) -> Result<Self, FinMetricsError> {
        let service = LlmExtractionService::from_config(&config)?;
        Ok(Self::new(config, Arc::new(service)))
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn plan(&self) -> &LocatePlan {
        &self.plan
    }

    fn progress(&self) -> Arc<dyn ExtractionProgressCallback> {
        self.config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback))
    }

    /// Run both phases over an already-open document.
    pub async fn run<S: PageSource + Sync + ?Sized>(&self, name: &str, source: &S) -> ExtractionOutcome {
        let located = self.plan.locate(source);
        self.finish(name, located).await
    }

    /// Run both phases over a local PDF.
    pub async fn run_path(&self, name: &str, path: &Path) -> Result<ExtractionOutcome, FinMetricsError> {
        let plan = self.plan.clone();
        let located = with_pdf(path, self.config.password.as_deref(), move |source| plan.locate(source)).await?;
        Ok(self.finish(name, located).await)
    }

    /// Resolve `input` (path or URL) and run both phases over it.
    pub async fn run_input(&self, input: &str) -> Result<ExtractionOutcome, FinMetricsError> {
        let resolved = input::resolve_input(input, self.config.download_timeout_secs).await?;
        self.run_path(input, resolved.path()).await
    }

    async fn finish(&self, name: &str, located: Located) -> ExtractionOutcome {
        let progress = self.progress();
        match located {
            Located::NothingFound { total_pages } => {
                progress.on_scan_complete(0, total_pages);
                info!("No page of '{}' mentions any keyword; skipping extraction", name);
                ExtractionOutcome::NothingFound {
                    source: name.to_string(),
                    total_pages,
                }
            }
            Located::Found(evidence) => {
                progress.on_scan_complete(evidence.flagged_pages.len(), evidence.total_pages);
                progress.on_snippets_ready(evidence.snippets.len());
                ExtractionOutcome::Extracted(self.resolve(name, evidence).await)
            }
        }
    }

    /// Resolve every configured keyword against `evidence`.
    ///
    /// Always returns exactly one record per keyword, in keyword order.
    pub async fn resolve(&self, name: &str, evidence: Evidence) -> ExtractionReport {
        let start = Instant::now();
        let progress = self.progress();
        let keywords = &self.config.keywords;
        let total = keywords.len();

        let mut result = ExtractionResult::new();
        let mut stats = ExtractionStats {
            total_pages: evidence.total_pages,
            flagged_pages: evidence.flagged_pages.len(),
            snippet_count: evidence.snippets.len(),
            locate_duration_ms: evidence.duration_ms,
            ..Default::default()
        };

        for (index, keyword) in keywords.iter().enumerate() {
            progress.on_keyword_start(keyword, index, total);
            let snippets = snippets_for(&evidence.snippets, keyword);
            debug!("'{}': {} snippets", keyword, snippets.len());

            if snippets.is_empty() && !self.config.query_without_evidence {
                progress.on_keyword_error(keyword, index, total, crate::output::NO_EVIDENCE_MARKER);
                result.insert(keyword.as_str(), MetricRecord::no_evidence());
                continue;
            }

            let resolution = self.resolver.resolve_detailed(keyword, &snippets).await;
            stats.service_calls += resolution.calls as usize;
            stats.total_input_tokens += resolution.input_tokens;
            stats.total_output_tokens += resolution.output_tokens;

            match &resolution.error {
                Some(e) => {
                    warn!("'{}' unresolved: {}", keyword, e);
                    progress.on_keyword_error(keyword, index, total, &e.to_string());
                }
                None => progress.on_keyword_complete(keyword, index, total),
            }
            result.insert(keyword.as_str(), resolution.record);
        }

        let success = result.success_count();
        stats.failed_keywords = total - success;
        stats.resolve_duration_ms = start.elapsed().as_millis() as u64;
        stats.total_duration_ms = stats.locate_duration_ms + stats.resolve_duration_ms;
        progress.on_extraction_complete(total, success);

        info!(
            "Extraction complete: {}/{} keywords resolved, {} service calls, {}ms",
            success, total, stats.service_calls, stats.total_duration_ms
        );

        ExtractionReport {
            source: name.to_string(),
            result,
            flagged_pages: evidence.flagged_pages,
            snippets: evidence.snippets,
            stats,
        }
    }
}

/// Analyse a PDF file or URL.
///
/// # Errors
/// Returns `Err(FinMetricsError)` only when the document cannot be opened
/// or no provider can be configured. Per-keyword failures are error records
/// inside the report.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, FinMetricsError> {
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pipeline = MetricPipeline::from_config(config.clone())?;
    pipeline.run_path(input_str, resolved.path()).await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, FinMetricsError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FinMetricsError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

/// Analyse PDF bytes held in memory. `name` labels the report.
pub async fn analyze_bytes(
    name: &str,
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, FinMetricsError> {
    let spooled = input::spool_bytes(name, bytes)?;
    let pipeline = MetricPipeline::from_config(config.clone())?;
    pipeline.run_path(name, spooled.path()).await
}

/// Analyse `input_str` and persist the result.
///
/// Only an extracted result is stored; a fatal error or a
/// [`ExtractionOutcome::NothingFound`] leaves the store untouched.
pub async fn analyze_and_store(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
    store: &dyn ResultStore,
) -> Result<(ExtractionOutcome, Option<StoredResult>), FinMetricsError> {
    let input_str = input_str.as_ref();
    let outcome = analyze(input_str, config).await?;
    let stored = store_outcome(input_str, &outcome, store).await?;
    Ok((outcome, stored))
}

/// Persist `outcome` if it carries a result.
pub async fn store_outcome(
    input_str: &str,
    outcome: &ExtractionOutcome,
    store: &dyn ResultStore,
) -> Result<Option<StoredResult>, FinMetricsError> {
    match outcome.report() {
        Some(report) => {
            let filename = display_name(input_str);
            Ok(Some(store.append(&filename, &report.result).await?))
        }
        None => Ok(None),
    }
}

/// Locate only: scan, extract and assemble snippets without any model call.
pub async fn locate(input_str: impl AsRef<str>, config: &ExtractionConfig) -> Result<Located, FinMetricsError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let plan = LocatePlan::from_config(config);
    with_pdf(resolved.path(), config.password.as_deref(), move |source| plan.locate(source)).await
}

/// Page count and the first [`PREVIEW_CHARS`] characters of text.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentSummary, FinMetricsError> {
    inspect_with_password(input_str, None).await
}

pub async fn inspect_with_password(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentSummary, FinMetricsError> {
    let input_str = input_str.as_ref();
    let resolved = input::resolve_input(input_str, 120).await?;
    let (page_count, preview) = with_pdf(resolved.path(), password, |source| {
        (source.page_count(), preview_text(source, PREVIEW_CHARS))
    })
    .await?;

    Ok(DocumentSummary {
        source: input_str.to_string(),
        page_count,
        preview,
    })
}

/// Concatenated page text, cut after `limit` characters.
///
/// Stops reading pages once the limit is reached.
pub fn preview_text<S: PageSource + ?Sized>(source: &S, limit: usize) -> String {
    let mut preview = String::new();
    let mut chars = 0;
    for index in 0..source.page_count() {
        if chars >= limit {
            break;
        }
        let Ok(text) = source.page_text(index) else {
            continue;
        };
        for ch in text.chars().take(limit - chars) {
            preview.push(ch);
            chars += 1;
        }
    }
    preview
}

/// File name of a path or URL, for store records.
fn display_name(input_str: &str) -> String {
    input_str
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(input_str)
        .to_string()
}
