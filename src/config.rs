//! Configuration types for financial-metric extraction.
//!
//! Every knob the pipeline consumes lives in [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The keyword list is part of the config
//! and is threaded explicitly through every stage; nothing reads it from
//! global state.

use crate::error::{FinMetricsError, ServiceErrorKind};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Line items searched for when the caller does not supply a list.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "Total Assets",
    "Total Liabilities",
    "Total Equity",
    "Revenue",
    "Net Income",
    "Operating Income",
    "Cash and Cash Equivalents",
    "Earnings Per Share",
];

/// Characters of context kept on each side of a keyword match.
pub const DEFAULT_WINDOW_RADIUS: usize = 200;

/// Maximum snippets sent downstream for one document.
pub const DEFAULT_MAX_SNIPPETS: usize = 20;

/// Configuration for one extraction pipeline.
///
/// # Example
/// ```rust
/// use edgequake_finmetrics::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .keywords(["Total Assets", "Net Income"])
///     .window_radius(150)
///     .include_tables(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.keywords.len(), 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Ordered keyword list. Earlier keywords have priority for the snippet budget.
    pub keywords: Vec<String>,

    /// Characters kept before the match start and after the match end. Default: 200.
    pub window_radius: usize,

    /// Global snippet budget across all keywords. Default: 20.
    pub max_snippets: usize,

    /// How the snippet budget is shared between keywords. Default: keyword priority.
    pub budget_policy: BudgetPolicy,

    /// Extract tables from flagged pages (thorough) or text only (cheap). Default: true.
    pub include_tables: bool,

    /// Retry behaviour around the extraction-service call. Default: no retries.
    pub retry: RetryPolicy,

    /// Call the service even for keywords with no snippets. Default: true.
    ///
    /// When false, such keywords get a "no evidence" error record without a call.
    pub query_without_evidence: bool,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per keyword. Default: 512.
    pub max_tokens: usize,

    /// Custom system instruction. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call timeout for the extraction service. Default: None (wait indefinitely).
    pub api_timeout_secs: Option<u64>,

    /// Optional progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            window_radius: DEFAULT_WINDOW_RADIUS,
            max_snippets: DEFAULT_MAX_SNIPPETS,
            budget_policy: BudgetPolicy::default(),
            include_tables: true,
            retry: RetryPolicy::default(),
            query_without_evidence: true,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 512,
            system_prompt: None,
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("keywords", &self.keywords)
            .field("window_radius", &self.window_radius)
            .field("max_snippets", &self.max_snippets)
            .field("budget_policy", &self.budget_policy)
            .field("include_tables", &self.include_tables)
            .field("retry", &self.retry)
            .field("query_without_evidence", &self.query_without_evidence)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn window_radius(mut self, radius: usize) -> Self {
        self.config.window_radius = radius;
        self
    }

    pub fn max_snippets(mut self, n: usize) -> Self {
        self.config.max_snippets = n;
        self
    }

    pub fn budget_policy(mut self, policy: BudgetPolicy) -> Self {
        self.config.budget_policy = policy;
        self
    }

    pub fn include_tables(mut self, v: bool) -> Self {
        self.config.include_tables = v;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry.backoff_ms = ms;
        self
    }

    pub fn query_without_evidence(mut self, v: bool) -> Self {
        self.config.query_without_evidence = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ExtractionConfig, FinMetricsError> {
        self.config.keywords = self
            .config
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .collect();

        let c = &self.config;
        if c.keywords.is_empty() {
            return Err(FinMetricsError::InvalidConfig(
                "At least one keyword is required".into(),
            ));
        }
        if c.keywords.iter().any(|k| k.is_empty()) {
            return Err(FinMetricsError::InvalidConfig(
                "Keywords must not be blank".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for k in &c.keywords {
            if !seen.insert(k.to_lowercase()) {
                return Err(FinMetricsError::InvalidConfig(format!(
                    "Duplicate keyword '{}'",
                    k
                )));
            }
        }
        if c.max_snippets == 0 {
            return Err(FinMetricsError::InvalidConfig(
                "Snippet budget must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(FinMetricsError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the global snippet budget is divided between keywords.
///
/// The budget is always global: no policy ever returns more than
/// `max_snippets` snippets in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BudgetPolicy {
    /// Keywords consume the budget in declared order. A verbose early keyword
    /// can leave nothing for later ones. (default)
    #[default]
    KeywordPriority,
    /// The budget is dealt out one snippet per keyword per round, so every
    /// keyword with evidence gets a share before any gets a second one.
    FairShare,
}

/// Retry policy for the extraction-service call.
///
/// The default performs no retries: a failed or malformed reply is recorded
/// as-is. Raise `max_retries` to opt in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first call. Default: 0.
    pub max_retries: u32,

    /// Initial backoff in milliseconds; doubles after each attempt. Default: 500.
    pub backoff_ms: u64,

    /// Service error classes that are retried.
    pub retry_on: Vec<ServiceErrorKind>,

    /// Also retry when the reply is not a JSON metric. Default: false.
    pub retry_malformed: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
            retry_on: vec![
                ServiceErrorKind::RateLimited,
                ServiceErrorKind::Timeout,
                ServiceErrorKind::Transport,
            ],
            retry_malformed: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a service failure of `kind` on attempt `attempt` (0-based) may be retried.
    pub fn should_retry(&self, kind: ServiceErrorKind, attempt: u32) -> bool {
        attempt < self.max_retries && self.retry_on.contains(&kind)
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> std::time::Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        std::time::Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.window_radius, 200);
        assert_eq!(c.max_snippets, 20);
        assert_eq!(c.retry.max_retries, 0);
        assert!(c.include_tables);
        assert_eq!(c.keywords[0], "Total Assets");
        assert!(c.api_timeout_secs.is_none());
    }

    #[test]
    fn empty_keywords_rejected() {
        let err = ExtractionConfig::builder()
            .keywords(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("keyword"), "got: {err}");
    }

    #[test]
    fn blank_and_duplicate_keywords_rejected() {
        assert!(ExtractionConfig::builder()
            .keywords(["Revenue", "  "])
            .build()
            .is_err());
        assert!(ExtractionConfig::builder()
            .keywords(["Revenue", "revenue"])
            .build()
            .is_err());
    }

    #[test]
    fn keywords_are_trimmed() {
        let c = ExtractionConfig::builder()
            .keywords([" Net Income "])
            .build()
            .unwrap();
        assert_eq!(c.keywords, vec!["Net Income".to_string()]);
    }

    #[test]
    fn zero_budget_rejected() {
        assert!(ExtractionConfig::builder().max_snippets(0).build().is_err());
    }

    #[test]
    fn retry_policy_respects_classes_and_count() {
        let p = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        assert!(p.should_retry(ServiceErrorKind::RateLimited, 0));
        assert!(p.should_retry(ServiceErrorKind::Transport, 1));
        assert!(!p.should_retry(ServiceErrorKind::Transport, 2));
        assert!(!p.should_retry(ServiceErrorKind::Auth, 0));
        assert!(!RetryPolicy::none().should_retry(ServiceErrorKind::Timeout, 0));
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_for(1).as_millis(), 500);
        assert_eq!(p.backoff_for(2).as_millis(), 1000);
        assert_eq!(p.backoff_for(3).as_millis(), 2000);
    }
}
