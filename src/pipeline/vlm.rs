//! A [`RecognitionEngine`] backed by a vision LLM.
//!
//! This adapter lets the pipeline run without a locally hosted OCR model:
//! the page PNG and the compiled instruction go to any multimodal provider
//! `edgequake-llm` supports, and the reply is handed back as engine text.
//! The grounding grammar is explained in the system prompt
//! ([`crate::prompts::VLM_SYSTEM_PROMPT`]).
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! load. Exponential backoff (`retry_backoff_ms * 2^attempt`) avoids a
//! thundering herd: with 500 ms base and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s. Each attempt is bounded by `api_timeout_secs`.

use crate::config::VlmSettings;
use crate::error::OcrError;
use crate::pipeline::encode::image_data;
use crate::pipeline::engine::{EngineOutput, InferenceRequest, RecognitionEngine};
use crate::prompts::VLM_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Vision-LLM recognition engine.
pub struct VlmEngine {
    provider: Arc<dyn LLMProvider>,
    settings: VlmSettings,
}

impl VlmEngine {
    /// Wrap an already-configured provider.
    pub fn new(provider: Arc<dyn LLMProvider>, settings: VlmSettings) -> Self {
        Self { provider, settings }
    }

    /// Resolve a provider from `settings` and the environment.
    pub fn from_settings(settings: VlmSettings) -> Result<Self, OcrError> {
        let provider = resolve_provider(&settings)?;
        info!(
            "VLM engine ready (model: {})",
            settings.model.as_deref().unwrap_or(DEFAULT_MODEL)
        );
        Ok(Self::new(provider, settings))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RecognitionEngine for VlmEngine {
    async fn infer(&self, request: &InferenceRequest) -> Result<EngineOutput, OcrError> {
        let start = Instant::now();
        let png = tokio::fs::read(&request.image_path)
            .await
            .map_err(|e| OcrError::EngineFailure {
                page: None,
                detail: format!("cannot read {}: {e}", request.image_path.display()),
            })?;

        let system_prompt = self
            .settings
            .system_prompt
            .as_deref()
            .unwrap_or(VLM_SYSTEM_PROMPT);
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(request.instruction.as_str(), vec![image_data(&png)]),
        ];
        let options = self.options();
        let per_call = Duration::from_secs(self.settings.api_timeout_secs);

        let mut last_err = String::from("no attempt made");
        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let backoff = self.settings.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "VLM retry {}/{} after {}ms",
                    attempt, self.settings.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(per_call, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "VLM: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(EngineOutput::Text(response.content));
                }
                Ok(Err(e)) => {
                    last_err = e.to_string();
                    warn!("VLM attempt {} failed — {}", attempt + 1, last_err);
                }
                Err(_) => {
                    last_err = format!("timed out after {}s", self.settings.api_timeout_secs);
                    warn!("VLM attempt {} {}", attempt + 1, last_err);
                }
            }
        }

        Err(OcrError::EngineFailure {
            page: None,
            detail: format!(
                "{} (after {} retries)",
                last_err, self.settings.max_retries
            ),
        })
    }

    fn name(&self) -> &str {
        "vlm"
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrError::EngineUnavailable {
            hint: format!("Provider '{provider_name}' is not configured: {e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`settings.provider`), used as-is.
/// 2. **Named provider + model** (`settings.provider_name`); the factory
///    reads the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(settings: &VlmSettings) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(ref provider) = settings.provider {
        return Ok(Arc::clone(provider));
    }

    let model = settings.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = settings.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| OcrError::EngineUnavailable {
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
