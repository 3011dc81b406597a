//! Per-keyword resolution: snippets → prompt → service → [`MetricRecord`].
//!
//! ## Retry Strategy
//!
//! Retries are opt-in. With the default [`RetryPolicy`] every keyword gets
//! exactly one service call and whatever comes back is recorded. Raising
//! `max_retries` retries only the error classes listed in
//! `RetryPolicy::retry_on`, with exponential backoff
//! (`backoff_ms * 2^(retry-1)`). Malformed replies are retried only when
//! `retry_malformed` is set.
//!
//! Resolution never returns an error: every outcome, including a failed
//! call, becomes a record.

use crate::config::{ExtractionConfig, RetryPolicy};
use crate::error::{MetricError, ServiceError, ServiceErrorKind};
use crate::output::{MetricRecord, MALFORMED_RESPONSE_MARKER};
use crate::pipeline::response::parse_metric_reply;
use crate::pipeline::service::{Completion, ExtractionService};
use crate::prompts::{metric_prompt, DEFAULT_SYSTEM_PROMPT};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Everything known about one keyword's resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: MetricRecord,
    /// Set when `record` is an error record.
    pub error: Option<MetricError>,
    /// Service calls made for this keyword.
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Resolves keywords one at a time against an [`ExtractionService`].
#[derive(Clone)]
pub struct MetricResolver {
    service: Arc<dyn ExtractionService>,
    system_prompt: String,
    retry: RetryPolicy,
    api_timeout: Option<Duration>,
}

impl MetricResolver {
    /// Resolver with the default system prompt, no retries and no timeout.
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            retry: RetryPolicy::default(),
            api_timeout: None,
        }
    }

    pub fn from_config(service: Arc<dyn ExtractionService>, config: &ExtractionConfig) -> Self {
        Self {
            service,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            retry: config.retry.clone(),
            api_timeout: config.api_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = Some(timeout);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Resolve `keyword` and return only the record.
    pub async fn resolve(&self, keyword: &str, snippets: &[&str]) -> MetricRecord {
        self.resolve_detailed(keyword, snippets).await.record
    }

    /// Resolve `keyword`, keeping call counts and the typed error.
    pub async fn resolve_detailed(&self, keyword: &str, snippets: &[&str]) -> Resolution {
        let start = Instant::now();
        let prompt = metric_prompt(keyword, snippets);
        let mut calls = 0u32;
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut attempt = 0u32;

        let (record, error) = loop {
            if attempt > 0 {
                let backoff = self.retry.backoff_for(attempt);
                warn!(
                    "'{}': retry {}/{} after {}ms",
                    keyword,
                    attempt,
                    self.retry.max_retries,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            calls += 1;
            match self.call(&prompt).await {
                Ok(completion) => {
                    input_tokens += completion.input_tokens as u64;
                    output_tokens += completion.output_tokens as u64;
                    match parse_metric_reply(keyword, &completion.content) {
                        Ok(value) => {
                            debug!("'{}': value {}", keyword, value.value);
                            break (MetricRecord::Extracted(value), None);
                        }
                        Err(e) => {
                            warn!("'{}': attempt {}: {}", keyword, attempt + 1, e);
                            if self.retry.retry_malformed && attempt < self.retry.max_retries {
                                attempt += 1;
                                continue;
                            }
                            break (MetricRecord::malformed(completion.content), Some(e));
                        }
                    }
                }
                Err(e) => {
                    warn!("'{}': attempt {} failed: {}", keyword, attempt + 1, e);
                    if self.retry.should_retry(e.kind, attempt) {
                        attempt += 1;
                        continue;
                    }
                    let err = MetricError::ServiceCall {
                        keyword: keyword.to_string(),
                        attempts: calls,
                        kind: e.kind,
                        detail: e.message.clone(),
                    };
                    break (MetricRecord::service_failure(e.to_string()), Some(err));
                }
            }
        };

        Resolution {
            record,
            error,
            calls,
            input_tokens,
            output_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn call(&self, prompt: &str) -> Result<Completion, ServiceError> {
        let fut = self.service.complete(&self.system_prompt, prompt);
        match self.api_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                ServiceError::new(
                    ServiceErrorKind::Timeout,
                    format!("no reply within {}s", limit.as_secs()),
                )
            })?,
            None => fut.await,
        }
    }
}

/// `true` if `record` is the marker record for a malformed reply.
pub fn is_malformed(record: &MetricRecord) -> bool {
    matches!(record, MetricRecord::Failed(f) if f.error == MALFORMED_RESPONSE_MARKER)
}
