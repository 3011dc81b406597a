//! The extraction service seam.
//!
//! The pipeline only needs "system instruction + user prompt in, text out".
//! [`ExtractionService`] captures exactly that so tests can script replies
//! and callers can plug in caching or rate limiting. [`LlmExtractionService`]
//! is the production implementation on top of `edgequake_llm`.

use crate::config::ExtractionConfig;
use crate::error::{FinMetricsError, ServiceError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default model when a provider is named or auto-detected without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// A single text completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Text-in / text-out completion service.
///
/// Implementations make no promise about the shape of the reply; callers
/// parse defensively.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<Completion, ServiceError>;
}

/// [`ExtractionService`] backed by an `edgequake_llm` provider.
pub struct LlmExtractionService {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmExtractionService {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, FinMetricsError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn complete(&self, system: &str, prompt: &str) -> Result<Completion, ServiceError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ServiceError::classify(e.to_string()))?;
        debug!(
            "Service reply: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, FinMetricsError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FinMetricsError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// How a provider is obtained when none was injected.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProviderChoice {
    /// Built by the factory from a provider name and model id.
    Named { provider: String, model: String },
    /// Whatever [`ProviderFactory::from_env`] finds, with its own model.
    AutoDetect,
}

/// Pick a provider source for a config without an injected provider.
///
/// Only a provider built by name honours `config.model`; auto-detection
/// brings its own model. Every keyword is one short JSON call, so when an
/// OpenAI key is present the provider is built by name to keep those calls
/// on [`DEFAULT_MODEL`] instead of the factory default.
fn choose_provider(config: &ExtractionConfig, env: impl Fn(&str) -> Option<String>) -> ProviderChoice {
    let var = |key: &str| env(key).filter(|v| !v.is_empty());

    if let Some(ref name) = config.provider_name {
        return ProviderChoice::Named {
            provider: name.clone(),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };
    }
    if let Some(provider) = var("EDGEQUAKE_LLM_PROVIDER") {
        // A non-OpenAI provider has no sensible fallback model.
        if let Some(model) = config.model.clone().or_else(|| var("EDGEQUAKE_MODEL")) {
            return ProviderChoice::Named { provider, model };
        }
    }
    if var("OPENAI_API_KEY").is_some() {
        return ProviderChoice::Named {
            provider: "openai".to_string(),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };
    }
    ProviderChoice::AutoDetect
}

/// Resolve the LLM provider for `config`. An injected provider always wins.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, FinMetricsError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    match choose_provider(config, |key| std::env::var(key).ok()) {
        ProviderChoice::Named { provider, model } => {
            debug!("Using provider '{}' with model '{}'", provider, model);
            create_provider(&provider, &model)
        }
        ProviderChoice::AutoDetect => {
            if let Some(ref model) = config.model {
                warn!("Model '{}' ignored: no provider named, auto-detecting", model);
            }
            let (llm_provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| FinMetricsError::ProviderNotConfigured {
                    provider: "auto".to_string(),
                    hint: format!(
                        "No LLM provider could be auto-detected from environment.\n\
                        Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or pass --provider.\n\
                        Error: {}",
                        e
                    ),
                })?;
            Ok(llm_provider)
        }
    }
}
