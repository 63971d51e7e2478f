//! Vision provider configuration parsed from environment variables.

use crate::config::{Lookup, env_lookup, non_empty, parse_or};
use crate::quota::is_model_allowed;

use super::types::VisionError;

pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GoogleAiStudio,
    OpenRouter,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoogleAiStudio => "google_ai_studio",
            Self::OpenRouter => "openrouter",
        }
    }

    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::GoogleAiStudio => "gemma-3-27b-it",
            Self::OpenRouter => "meta-llama/llama-3.2-11b-vision-instruct:free",
        }
    }

    /// Models tried after the primary one, in order.
    #[must_use]
    pub fn fallback_models(self) -> &'static [&'static str] {
        match self {
            Self::GoogleAiStudio => &[
                "gemma-3-27b-it",
                "gemini-2.0-flash-exp",
                "gemini-2.0-flash",
                "gemini-2.0-flash-lite",
                "gemini-1.5-flash",
                "gemini-1.5-pro",
            ],
            Self::OpenRouter => &[
                "meta-llama/llama-3.2-11b-vision-instruct:free",
                "meta-llama/llama-3.2-90b-vision-instruct:free",
            ],
        }
    }

    fn key_var(self) -> &'static str {
        match self {
            Self::GoogleAiStudio => "GOOGLE_AI_STUDIO_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::GoogleAiStudio => DEFAULT_GOOGLE_BASE_URL,
            Self::OpenRouter => DEFAULT_OPENROUTER_BASE_URL,
        }
    }
}

/// Parse `AI_PROVIDER`; absent means Google AI Studio.
///
/// # Errors
///
/// Returns `ConfigParse` for an unknown provider name.
pub fn parse_provider(raw: Option<&str>) -> Result<ProviderKind, VisionError> {
    match raw.map(str::trim).unwrap_or("google_ai_studio") {
        "google_ai_studio" => Ok(ProviderKind::GoogleAiStudio),
        "openrouter" => Ok(ProviderKind::OpenRouter),
        other => Err(VisionError::ConfigParse(format!("unknown AI_PROVIDER: {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisionTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeouts: VisionTimeouts,
}

impl VisionConfig {
    /// Build typed vision config from environment variables.
    ///
    /// Required:
    /// - `GOOGLE_AI_STUDIO_API_KEY` or `OPENROUTER_API_KEY`, matching the provider
    ///
    /// Optional:
    /// - `AI_PROVIDER`: `google_ai_studio` (default) or `openrouter`
    /// - `AI_MODEL`: provider default when absent or not on the free whitelist
    /// - `AI_BASE_URL`: provider API base URL
    /// - `AI_REQUEST_TIMEOUT_SECS`: default 120
    /// - `AI_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown provider or a missing API key.
    pub fn from_env() -> Result<Self, VisionError> {
        Self::from_lookup(&env_lookup)
    }

    /// Same as [`VisionConfig::from_env`] over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown provider or a missing API key.
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, VisionError> {
        let provider = parse_provider(lookup("AI_PROVIDER").as_deref())?;
        let api_key = non_empty(lookup, provider.key_var()).ok_or(VisionError::NotConfigured { var: provider.key_var() })?;
        let model = resolve_model(provider, non_empty(lookup, "AI_MODEL").as_deref());
        let base_url = non_empty(lookup, "AI_BASE_URL")
            .unwrap_or_else(|| provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();
        let timeouts = VisionTimeouts {
            request_secs: parse_or(lookup, "AI_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(lookup, "AI_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { provider, api_key, model, base_url, timeouts })
    }
}

/// Use the requested model only when it is free; otherwise the provider default.
#[must_use]
pub fn resolve_model(provider: ProviderKind, requested: Option<&str>) -> String {
    match requested {
        Some(model) if is_model_allowed(model) => model.to_string(),
        Some(model) => {
            tracing::warn!(model, fallback = provider.default_model(), "model not in free list, falling back");
            provider.default_model().to_string()
        }
        None => provider.default_model().to_string(),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
