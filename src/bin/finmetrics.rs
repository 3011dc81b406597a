//! CLI binary for edgequake-finmetrics.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_finmetrics::{
    analyze, inspect_with_password, locate, BudgetPolicy, ExtractionConfig, ExtractionOutcome,
    ExtractionProgressCallback, JsonlResultStore, Located, MetricRecord, ProgressCallback,
    ResultStore, StoredResult,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the document is scanned, then one bar step per keyword.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} keywords  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_scan_complete(&self, flagged_pages: usize, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{flagged_pages}/{total_pages} pages mention a keyword"))
        ));
        if flagged_pages == 0 {
            self.bar.finish_and_clear();
        }
    }

    fn on_snippets_ready(&self, snippet_count: usize) {
        self.bar
            .println(format!("  {}", dim(&format!("{snippet_count} snippets assembled"))));
    }

    fn on_keyword_start(&self, keyword: &str, index: usize, total: usize) {
        if index == 0 {
            self.activate_bar(total);
        }
        self.bar.set_message(keyword.to_string());
    }

    fn on_keyword_complete(&self, keyword: &str, _index: usize, _total: usize) {
        self.bar.println(format!("  {} {}", green("✓"), keyword));
        self.bar.inc(1);
    }

    fn on_keyword_error(&self, keyword: &str, _index: usize, _total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), keyword, red(&msg)));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} keywords resolved", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} keywords resolved  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default keyword list, human-readable output
  finmetrics annual-report.pdf

  # Specific keywords, JSON output
  finmetrics -k "Total Assets,Net Income" --json report.pdf

  # See which snippets would be sent, without calling a model
  finmetrics --dry-run report.pdf

  # Page count and a text preview (no API key needed)
  finmetrics --inspect-only report.pdf

  # Persist results and browse them later
  finmetrics --store results.jsonl report.pdf
  finmetrics --store results.jsonl --history
  finmetrics --store results.jsonl --show 6f1c…

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  FINMETRICS_*            Any flag below, e.g. FINMETRICS_KEYWORDS
"#;

/// Extract financial metrics from report PDFs using an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "finmetrics",
    version,
    about = "Extract financial metrics from report PDFs using an LLM",
    long_about = "Scan a PDF for pages that mention financial line items, cut keyword-centred \
snippets from those pages (text and tables), and ask an LLM for each metric's value, unit and \
year as strict JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present_any = ["history", "show"])]
    input: Option<String>,

    /// Comma-separated metric keywords. Default: the built-in financial list.
    #[arg(short, long, env = "FINMETRICS_KEYWORDS", value_delimiter = ',')]
    keywords: Vec<String>,

    /// Characters of context kept each side of a keyword match.
    #[arg(long, env = "FINMETRICS_WINDOW_RADIUS", default_value_t = 200)]
    window_radius: usize,

    /// Maximum snippets sent to the model across all keywords.
    #[arg(long, env = "FINMETRICS_MAX_SNIPPETS", default_value_t = 20)]
    max_snippets: usize,

    /// Share the snippet budget round-robin instead of in keyword order.
    #[arg(long, env = "FINMETRICS_FAIR_SHARE")]
    fair_share: bool,

    /// Skip table extraction (text only).
    #[arg(long, env = "FINMETRICS_NO_TABLES")]
    no_tables: bool,

    /// Do not call the model for keywords without any snippet.
    #[arg(long, env = "FINMETRICS_SKIP_WITHOUT_EVIDENCE")]
    skip_without_evidence: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FINMETRICS_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per keyword.
    #[arg(long, env = "FINMETRICS_MAX_TOKENS", default_value_t = 512)]
    max_tokens: usize,

    /// Retries per keyword on rate limits, timeouts and transport errors.
    #[arg(long, env = "FINMETRICS_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Base backoff between retries in milliseconds (doubles each retry).
    #[arg(long, env = "FINMETRICS_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "FINMETRICS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FINMETRICS_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FINMETRICS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-keyword LLM call timeout in seconds. Default: none.
    #[arg(long, env = "FINMETRICS_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Output the full report as JSON.
    #[arg(long, env = "FINMETRICS_JSON")]
    json: bool,

    /// Scan and assemble snippets only; no model call.
    #[arg(long)]
    dry_run: bool,

    /// Print page count and a text preview only.
    #[arg(long)]
    inspect_only: bool,

    /// JSON-lines file to append results to.
    #[arg(long, env = "FINMETRICS_STORE")]
    store: Option<PathBuf>,

    /// List stored results, newest first (requires --store).
    #[arg(long, requires = "store")]
    history: bool,

    /// Print one stored result by id (requires --store).
    #[arg(long, requires = "store")]
    show: Option<Uuid>,

    /// Disable progress bar.
    #[arg(long, env = "FINMETRICS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FINMETRICS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FINMETRICS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Store queries ────────────────────────────────────────────────────
    if cli.history || cli.show.is_some() {
        let path = cli.store.clone().context("--store is required")?;
        let store = JsonlResultStore::new(path);
        if let Some(id) = cli.show {
            let record = store
                .get(id)
                .await
                .context("Failed to read result store")?
                .with_context(|| format!("No stored result with id {id}"))?;
            print_stored(&record, cli.json)?;
        } else {
            let records = store.list().await.context("Failed to read result store")?;
            print_history(&records, cli.json)?;
        }
        return Ok(());
    }

    let input = cli.input.clone().context("An input PDF or URL is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect_with_password(&input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("File:     {}", summary.source);
            println!("Pages:    {}", summary.page_count);
            println!("Preview:\n{}", summary.preview);
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.dry_run {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let located = locate(&input, &config).await.context("Failed to scan PDF")?;
        print_located(&located, cli.json)?;
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let outcome = analyze(&input, &config).await.context("Extraction failed")?;

    if let Some(ref path) = cli.store {
        let store = JsonlResultStore::new(path);
        if let Some(stored) = edgequake_finmetrics::analyze::store_outcome(&input, &outcome, &store)
            .await
            .context("Failed to store result")?
        {
            if !cli.quiet {
                eprintln!("{} stored as {}", dim("↳"), bold(&stored.id.to_string()));
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise output")?
        );
        return Ok(());
    }

    match &outcome {
        ExtractionOutcome::NothingFound { total_pages, .. } => {
            if !cli.quiet {
                eprintln!(
                    "{} none of the {} pages mention any keyword; nothing extracted",
                    cyan("⚠"),
                    total_pages
                );
            }
        }
        ExtractionOutcome::Extracted(report) => {
            for (keyword, record) in report.result.iter() {
                println!("{}", format_record(keyword, record));
            }
            if !cli.quiet {
                let s = &report.stats;
                eprintln!(
                    "   {} pages flagged  /  {} snippets  /  {} calls  /  {} tokens in  /  {} tokens out  /  {}ms",
                    s.flagged_pages,
                    s.snippet_count,
                    s.service_calls,
                    dim(&s.total_input_tokens.to_string()),
                    dim(&s.total_output_tokens.to_string()),
                    s.total_duration_ms,
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .window_radius(cli.window_radius)
        .max_snippets(cli.max_snippets)
        .budget_policy(if cli.fair_share {
            BudgetPolicy::FairShare
        } else {
            BudgetPolicy::KeywordPriority
        })
        .include_tables(!cli.no_tables)
        .query_without_evidence(!cli.skip_without_evidence)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout);

    if !cli.keywords.is_empty() {
        builder = builder.keywords(cli.keywords.iter().cloned());
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn json_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn format_record(keyword: &str, record: &MetricRecord) -> String {
    match record {
        MetricRecord::Extracted(v) => {
            let value = json_text(&v.value).unwrap_or_else(|| "n/a".to_string());
            let unit = json_text(&v.unit).map(|u| format!(" {u}")).unwrap_or_default();
            let year = json_text(&v.year).map(|y| format!("  ({y})")).unwrap_or_default();
            format!("{} {:<28} {}{}{}", green("✓"), keyword, bold(&value), unit, dim(&year))
        }
        MetricRecord::Failed(f) => {
            let extra = f
                .detail
                .clone()
                .or_else(|| (!f.raw.is_empty()).then(|| f.raw.clone()))
                .map(|d| format!("  {}", dim(&d)))
                .unwrap_or_default();
            format!("{} {:<28} {}{}", red("✗"), keyword, red(&f.error), extra)
        }
    }
}

fn print_located(located: &Located, json: bool) -> Result<()> {
    match located {
        Located::NothingFound { total_pages } => {
            if json {
                println!("{}", serde_json::json!({"status": "nothing_found", "total_pages": total_pages}));
            } else {
                println!("No page of {total_pages} mentions any keyword.");
            }
        }
        Located::Found(evidence) => {
            if json {
                let value = serde_json::json!({
                    "status": "found",
                    "total_pages": evidence.total_pages,
                    "flagged_pages": evidence.flagged_pages,
                    "snippets": evidence.snippets,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).context("Failed to serialise snippets")?
                );
            } else {
                let pages: Vec<String> = evidence.flagged_pages.iter().map(|p| (p + 1).to_string()).collect();
                println!("Flagged pages: {}", pages.join(", "));
                for snippet in &evidence.snippets {
                    println!("\n{} {}", cyan("◆"), bold(&snippet.keyword));
                    println!("{}", snippet.text.trim());
                }
            }
        }
    }
    Ok(())
}

fn print_history(records: &[StoredResult], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(records).context("Failed to serialise history")?
        );
        return Ok(());
    }
    if records.is_empty() {
        println!("No stored results.");
    }
    for r in records {
        println!(
            "{}  {}  {}",
            r.id,
            dim(&r.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            r.filename
        );
    }
    Ok(())
}

fn print_stored(record: &StoredResult, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(record).context("Failed to serialise record")?
        );
        return Ok(());
    }
    println!("{} {}  {}", bold(&record.filename), dim(&record.id.to_string()), dim(&record.created_at.to_rfc3339()));
    let result = record.result().context("Stored result is not valid JSON")?;
    for (keyword, r) in result.iter() {
        println!("{}", format_record(keyword, r));
    }
    Ok(())
}
