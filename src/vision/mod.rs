//! Vision: provider adapters for payment screenshot extraction.
//!
//! DESIGN
//! ======
//! `VisionClient` dispatches to Google AI Studio or OpenRouter based on
//! `AI_PROVIDER` and walks a fallback chain of free models: the configured
//! model first, then the provider's fallbacks, skipping anything off the
//! whitelist. The first model that answers wins. A billing signal stops the
//! walk immediately since another model on the same account would be billed
//! too.

pub mod config;
pub mod google;
pub mod openrouter;
pub mod types;

use config::{ProviderKind, VisionConfig};
pub use types::{ImagePart, VisionError, VisionModel, VisionReply};

use crate::quota::is_model_allowed;

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete vision client that dispatches to the configured provider.
pub struct VisionClient {
    inner: VisionProvider,
    kind: ProviderKind,
    model: String,
}

enum VisionProvider {
    Google(google::GoogleAiStudioClient),
    OpenRouter(openrouter::OpenRouterClient),
}

impl VisionClient {
    /// Build a vision client from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown, the API key is missing,
    /// or the HTTP client fails.
    pub fn from_env() -> Result<Self, VisionError> {
        Self::from_config(VisionConfig::from_env()?)
    }

    /// Build a vision client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: VisionConfig) -> Result<Self, VisionError> {
        let inner = match config.provider {
            ProviderKind::GoogleAiStudio => VisionProvider::Google(google::GoogleAiStudioClient::new(
                config.api_key,
                config.base_url,
                config.timeouts,
            )?),
            ProviderKind::OpenRouter => VisionProvider::OpenRouter(openrouter::OpenRouterClient::new(
                config.api_key,
                config.base_url,
                config.timeouts,
            )?),
        };
        Ok(Self { inner, kind: config.provider, model: config.model })
    }

    async fn generate_with(&self, model: &str, prompt: &str, image: &ImagePart) -> Result<String, VisionError> {
        match &self.inner {
            VisionProvider::Google(c) => c.generate(model, prompt, image).await,
            VisionProvider::OpenRouter(c) => c.generate(model, prompt, image).await,
        }
    }
}

/// Primary model followed by provider fallbacks, de-duplicated in order and
/// restricted to the free whitelist.
#[must_use]
pub fn fallback_chain(kind: ProviderKind, primary: &str) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    for model in std::iter::once(primary).chain(kind.fallback_models().iter().copied()) {
        if is_model_allowed(model) && !chain.iter().any(|m| m == model) {
            chain.push(model.to_string());
        }
    }
    chain
}

#[async_trait::async_trait]
impl VisionModel for VisionClient {
    fn provider_name(&self) -> &str {
        self.kind.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, image: &ImagePart) -> Result<VisionReply, VisionError> {
        let chain = fallback_chain(self.kind, &self.model);
        if chain.is_empty() {
            return Err(VisionError::NoAllowedModel);
        }

        let mut last_error = None;
        for model in chain {
            tracing::info!(model = %model, "vision: attempting model");
            match self.generate_with(&model, prompt, image).await {
                Ok(text) => {
                    tracing::info!(model = %model, "vision: model succeeded");
                    return Ok(VisionReply { text, model });
                }
                Err(e @ VisionError::BillingDetected { .. }) => {
                    tracing::error!(model = %model, error = %e, "vision: billing detected, stopping");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "vision: model failed");
                    last_error = Some(e);
                }
            }
        }

        Err(VisionError::AllModelsFailed { last: last_error.map(|e| e.to_string()).unwrap_or_default() })
    }
}
