//! Integration tests for the two-phase pipeline over in-memory documents.
//!
//! The extraction service is a scripted mock, so these tests need neither
//! pdfium nor an API key.

use async_trait::async_trait;
use edgequake_finmetrics::pipeline::extract::extract_pages;
use edgequake_finmetrics::pipeline::scan::scan_pages;
use edgequake_finmetrics::pipeline::snippets::SnippetAssembler;
use edgequake_finmetrics::{
    BudgetPolicy, Completion, Document, ExtractionConfig, ExtractionOutcome,
    ExtractionProgressCallback, ExtractionService, MemoryResultStore, MetricPipeline, MetricRecord,
    ResultStore, Row, ServiceError, ServiceErrorKind, Table,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers by keyword; unknown keywords get `{"value": null}`.
struct MockService {
    replies: Vec<(String, Result<String, ServiceErrorKind>)>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockService {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn reply(mut self, keyword: &str, text: &str) -> Self {
        self.replies.push((keyword.to_string(), Ok(text.to_string())));
        self
    }

    fn fail(mut self, keyword: &str, kind: ServiceErrorKind) -> Self {
        self.replies.push((keyword.to_string(), Err(kind)));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for MockService {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<Completion, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        for (keyword, reply) in &self.replies {
            if prompt.starts_with(&format!("Extract the value of \"{keyword}\"")) {
                return match reply {
                    Ok(text) => Ok(Completion {
                        content: text.clone(),
                        input_tokens: 100,
                        output_tokens: 20,
                    }),
                    Err(kind) => Err(ServiceError::new(*kind, "mock failure")),
                };
            }
        }
        Ok(Completion::text(r#"{"value": null}"#))
    }
}

/// Route library logs through the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(keywords: &[&str]) -> ExtractionConfig {
    init_tracing();
    ExtractionConfig::builder()
        .keywords(keywords.iter().copied())
        .build()
        .unwrap()
}

fn kw(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn three_page_report() -> Document {
    Document::from_page_texts(
        "report",
        [
            "Chairman's letter. A year of steady growth.",
            "Operational highlights and outlook.",
            "Balance sheet. Total Assets 1,234 million 2023. Liabilities follow.",
        ],
    )
}

// ── Scenario 1: one matching page ────────────────────────────────────────────

#[tokio::test]
async fn scenario_single_matching_page() {
    let doc = three_page_report();
    let keywords = kw(&["Total Assets"]);

    let flagged = scan_pages(&doc, &keywords);
    assert_eq!(flagged, vec![2]);

    let content = extract_pages(&doc, &flagged, true);
    assert!(content.text.contains("Total Assets 1,234 million 2023"));

    let snippets = SnippetAssembler::new(200, 20, BudgetPolicy::KeywordPriority).assemble(&content, &keywords);
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0].text.contains("Total Assets 1,234 million 2023"));

    let service = Arc::new(MockService::new().reply(
        "Total Assets",
        r#"{"metric":"Total Assets","value":"1234","unit":"million","year":2023}"#,
    ));
    let pipeline = MetricPipeline::new(config(&["Total Assets"]), service.clone());
    let outcome = pipeline.run("report", &doc).await;

    let report = outcome.report().expect("pages were flagged");
    assert_eq!(report.flagged_pages, vec![2]);
    assert_eq!(
        serde_json::to_value(report.result.get("Total Assets").unwrap()).unwrap(),
        json!({"metric":"Total Assets","value":"1234","unit":"million","year":2023})
    );
    assert_eq!(service.calls(), 1);
    assert_eq!(report.stats.service_calls, 1);
    assert_eq!(report.stats.total_input_tokens, 100);
    assert!(service.prompts.lock().unwrap()[0].contains("Total Assets 1,234 million 2023"));
}

// ── Scenario 2: nothing matches ──────────────────────────────────────────────

#[tokio::test]
async fn scenario_no_match_makes_no_service_call() {
    let doc = Document::from_page_texts("memo", ["Staff picnic on Friday.", "Parking changes."]);
    assert!(scan_pages(&doc, &kw(&["Total Assets", "Revenue"])).is_empty());

    let service = Arc::new(MockService::new());
    let pipeline = MetricPipeline::new(config(&["Total Assets", "Revenue"]), service.clone());
    let outcome = pipeline.run("memo", &doc).await;

    assert!(outcome.is_nothing_found());
    match outcome {
        ExtractionOutcome::NothingFound { total_pages, source } => {
            assert_eq!(total_pages, 2);
            assert_eq!(source, "memo");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(service.calls(), 0);
}

// ── Scenario 3: malformed reply ──────────────────────────────────────────────

#[tokio::test]
async fn scenario_malformed_reply_is_recorded_verbatim() {
    let service = Arc::new(MockService::new().reply("Total Assets", "not json"));
    let pipeline = MetricPipeline::new(config(&["Total Assets"]), service);
    let outcome = pipeline.run("report", &three_page_report()).await;

    let record = outcome.report().unwrap().result.get("Total Assets").unwrap();
    assert_eq!(
        serde_json::to_value(record).unwrap(),
        json!({"error": "invalid JSON response", "raw": "not json"})
    );
}

// ── Resolution invariants ────────────────────────────────────────────────────

#[tokio::test]
async fn one_record_per_keyword_in_order_despite_failures() {
    let doc = Document::from_page_texts(
        "report",
        ["Revenue 10. Net Income 2. Goodwill 7. Total Equity 40."],
    );
    let service = Arc::new(
        MockService::new()
            .reply("Revenue", r#"{"metric":"Revenue","value":"10","unit":null,"year":null}"#)
            .reply("Net Income", "Sorry, I can't help with that.")
            .fail("Goodwill", ServiceErrorKind::Auth),
    );
    let keywords = ["Revenue", "Net Income", "Goodwill", "Total Equity"];
    let pipeline = MetricPipeline::new(config(&keywords), service.clone());
    let report = pipeline.run("report", &doc).await.report().cloned().unwrap();

    assert_eq!(report.result.keywords().collect::<Vec<_>>(), keywords);
    assert!(!report.result.get("Revenue").unwrap().is_error());
    assert!(report.result.get("Net Income").unwrap().is_error());
    assert!(report.result.get("Goodwill").unwrap().is_error());
    assert!(!report.result.get("Total Equity").unwrap().is_error());
    assert_eq!(report.stats.failed_keywords, 2);
    assert_eq!(service.calls(), 4);
}

#[tokio::test]
async fn keywords_without_evidence_still_query_by_default() {
    let doc = Document::from_page_texts("report", ["Revenue 10."]);
    let service = Arc::new(MockService::new());
    let pipeline = MetricPipeline::new(config(&["Revenue", "Goodwill"]), service.clone());
    let report = pipeline.run("report", &doc).await.report().cloned().unwrap();

    assert_eq!(service.calls(), 2);
    assert_eq!(report.result.len(), 2);
    assert!(service.prompts.lock().unwrap()[1].contains("no excerpts"));
}

#[tokio::test]
async fn keywords_without_evidence_can_be_skipped() {
    let doc = Document::from_page_texts("report", ["Revenue 10."]);
    let service = Arc::new(MockService::new());
    let config = ExtractionConfig::builder()
        .keywords(["Revenue", "Goodwill"])
        .query_without_evidence(false)
        .build()
        .unwrap();
    let report = MetricPipeline::new(config, service.clone())
        .run("report", &doc)
        .await
        .report()
        .cloned()
        .unwrap();

    assert_eq!(service.calls(), 1);
    assert_eq!(
        serde_json::to_value(report.result.get("Goodwill").unwrap()).unwrap(),
        json!({"error": "no evidence found", "raw": ""})
    );
}

#[tokio::test]
async fn retries_apply_only_when_configured() {
    let doc = Document::from_page_texts("report", ["Revenue 10."]);
    let service = Arc::new(MockService::new().fail("Revenue", ServiceErrorKind::RateLimited));
    let config = ExtractionConfig::builder()
        .keywords(["Revenue"])
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let report = MetricPipeline::new(config, service.clone())
        .run("report", &doc)
        .await
        .report()
        .cloned()
        .unwrap();

    assert_eq!(service.calls(), 3);
    assert_eq!(report.stats.service_calls, 3);
    match report.result.get("Revenue").unwrap() {
        MetricRecord::Failed(f) => assert_eq!(f.error, "extraction service call failed"),
        other => panic!("unexpected: {other:?}"),
    }
}

// ── Tables ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn table_rows_reach_the_service_unless_disabled() {
    let doc = Document::from_page_texts("report", ["Chairman's letter", "Balance sheet\nTotal Assets 1,234 1,100"])
        .with_tables(
            1,
            vec![Table::new(vec![
                Row::from_texts(["", "2023", "2022"]),
                Row::from_texts(["Total Assets", "1,234", "1,100"]),
            ])],
        );

    let service = Arc::new(MockService::new());
    let report = MetricPipeline::new(config(&["Total Assets"]), service.clone())
        .run("report", &doc)
        .await
        .report()
        .cloned()
        .unwrap();
    assert!(report.snippets.iter().any(|s| s.text == "Total Assets | 1,234 | 1,100"));
    assert!(service.prompts.lock().unwrap()[0].contains("Total Assets | 1,234 | 1,100"));

    let text_only = ExtractionConfig::builder()
        .keywords(["Total Assets"])
        .include_tables(false)
        .build()
        .unwrap();
    let report = MetricPipeline::new(text_only, Arc::new(MockService::new()))
        .run("report", &doc)
        .await
        .report()
        .cloned()
        .unwrap();
    assert!(report.snippets.iter().all(|s| !s.text.contains(" | ")));
}

// ── Properties over a set of documents ───────────────────────────────────────

fn corpus() -> Vec<Document> {
    vec![
        Document::default(),
        Document::from_page_texts("empty-pages", ["", "", ""]),
        three_page_report(),
        Document::from_page_texts(
            "dense",
            std::iter::repeat("Revenue rose; revenue guidance for REVENUE. Net Income fell. ").take(12),
        ),
        Document::from_page_texts(
            "unicode",
            ["Umsatz € 5 Mio — Revenue ≈ 5 € m", "日本語 Revenue テキスト", "Net Income: £3m"],
        ),
    ]
}

#[test]
fn scan_indices_strictly_increase_within_bounds() {
    let keywords = kw(&["Revenue", "Net Income", "Total Assets"]);
    for doc in corpus() {
        let flagged = scan_pages(&doc, &keywords);
        assert!(flagged.windows(2).all(|w| w[0] < w[1]), "{}: {flagged:?}", doc.source);
        assert!(flagged.iter().all(|&i| i < doc.pages.len()));
    }
}

#[test]
fn extract_ignores_out_of_range_pages() {
    let doc = three_page_report();
    let content = extract_pages(&doc, &[7, 2, 0, 2, 99], false);
    assert_eq!(content.page_indices(), vec![0, 2]);
}

#[test]
fn assembled_snippets_respect_budget_and_window() {
    let keywords = kw(&["Revenue", "Net Income"]);
    for doc in corpus() {
        for (radius, budget) in [(0, 1), (5, 3), (40, 20)] {
            for policy in [BudgetPolicy::KeywordPriority, BudgetPolicy::FairShare] {
                let content = extract_pages(
                    &doc,
                    &scan_pages(&doc, &keywords),
                    true,
                );
                let snippets = SnippetAssembler::new(radius, budget, policy).assemble(&content, &keywords);
                assert!(snippets.len() <= budget);
                for s in &snippets {
                    let limit = 2 * radius + s.keyword.chars().count();
                    assert!(
                        s.text.chars().count() <= limit,
                        "{}: {:?} longer than {limit}",
                        doc.source,
                        s.text
                    );
                }
            }
        }
    }
}

#[test]
fn keyword_priority_can_starve_later_keywords() {
    let docs = corpus();
    let doc = &docs[3];
    let keywords = kw(&["Revenue", "Net Income"]);
    let content = extract_pages(doc, &scan_pages(doc, &keywords), false);

    let priority = SnippetAssembler::new(10, 5, BudgetPolicy::KeywordPriority).assemble(&content, &keywords);
    assert!(priority.iter().all(|s| s.keyword == "Revenue"));

    let fair = SnippetAssembler::new(10, 5, BudgetPolicy::FairShare).assemble(&content, &keywords);
    assert!(fair.iter().any(|s| s.keyword == "Net Income"));
}

#[tokio::test]
async fn rerunning_yields_identical_snippets_and_results() {
    let docs = corpus();
    let doc = &docs[4];
    let keywords = ["Revenue", "Net Income"];
    let pipeline = MetricPipeline::new(config(&keywords), Arc::new(MockService::new()));
    let first = pipeline.run("unicode", doc).await.report().cloned().unwrap();
    let second = pipeline.run("unicode", doc).await.report().cloned().unwrap();
    assert_eq!(first.snippets, second.snippets);
    assert_eq!(first.result, second.result);
}

// ── Progress and persistence ─────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_scan_complete(&self, flagged_pages: usize, total_pages: usize) {
        self.events.lock().unwrap().push(format!("scan {flagged_pages}/{total_pages}"));
    }
    fn on_keyword_complete(&self, keyword: &str, index: usize, total: usize) {
        self.events.lock().unwrap().push(format!("ok {keyword} {index}/{total}"));
    }
    fn on_keyword_error(&self, keyword: &str, index: usize, total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {keyword} {index}/{total}"));
    }
    fn on_extraction_complete(&self, total: usize, success_count: usize) {
        self.events.lock().unwrap().push(format!("done {success_count}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_follow_keyword_order() {
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .keywords(["Total Assets", "Revenue"])
        .progress_callback(recorder.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();
    let service = Arc::new(MockService::new().reply("Revenue", "garbage"));
    MetricPipeline::new(config, service).run("report", &three_page_report()).await;

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "scan 1/3",
            "ok Total Assets 0/2",
            "err Revenue 1/2",
            "done 1/2",
        ]
    );
}

#[tokio::test]
async fn extracted_results_can_be_stored() {
    let store = MemoryResultStore::new();
    let pipeline = MetricPipeline::new(config(&["Total Assets"]), Arc::new(MockService::new()));
    let outcome = pipeline.run("report", &three_page_report()).await;

    let stored = edgequake_finmetrics::analyze::store_outcome("/tmp/report.pdf", &outcome, &store)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.filename, "report.pdf");
    assert_eq!(stored.result().unwrap(), outcome.report().unwrap().result);

    let nothing = MetricPipeline::new(config(&["Goodwill"]), Arc::new(MockService::new()))
        .run("report", &three_page_report())
        .await;
    assert!(edgequake_finmetrics::analyze::store_outcome("x.pdf", &nothing, &store)
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.list().await.unwrap().len(), 1);
}
