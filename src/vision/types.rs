//! Vision types: provider-neutral image input, replies, and errors.

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::HeaderMap;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by vision provider operations.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The provider has no API key configured.
    #[error("vision provider not configured: {var} not set")]
    NotConfigured { var: &'static str },

    /// The HTTP request to the provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The provider signalled that the call was billed.
    #[error("billing detected for model {model} (header {header})")]
    BillingDetected { model: String, header: &'static str },

    /// No model in the fallback chain is on the free whitelist.
    #[error("no free model available")]
    NoAllowedModel,

    /// Every model in the fallback chain failed.
    #[error("all models failed. Last error: {last}")]
    AllModelsFailed { last: String },
}

impl crate::error::ErrorCode for VisionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::NotConfigured { .. } => "E_NOT_CONFIGURED",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::ApiParse(_) => "E_API_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::BillingDetected { .. } => "E_BILLING_DETECTED",
            Self::NoAllowedModel => "E_NO_ALLOWED_MODEL",
            Self::AllModelsFailed { .. } => "E_ALL_MODELS_FAILED",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::ConfigParse(_) | Self::NotConfigured { .. } | Self::HttpClientBuild(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// IMAGE INPUT
// =============================================================================

/// Decoded image bytes plus the MIME type sent to the provider.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

impl ImagePart {
    #[must_use]
    pub fn new(mime_type: &'static str, data: Vec<u8>) -> Self {
        Self { mime_type, data }
    }

    /// Standard base64 of the raw bytes.
    #[must_use]
    pub fn base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// `data:` URL form used by OpenAI-compatible APIs.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

// =============================================================================
// REPLY
// =============================================================================

/// Text returned by a vision model, tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionReply {
    pub text: String,
    pub model: String,
}

// =============================================================================
// VISION MODEL TRAIT
// =============================================================================

/// Provider-neutral async trait for image + prompt generation. Enables
/// mocking in tests.
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider identifier reported in response metadata.
    fn provider_name(&self) -> &str;

    /// Primary model identifier.
    fn model(&self) -> &str;

    /// Whether the primary model is on the free whitelist.
    fn is_free_tier(&self) -> bool {
        crate::quota::is_model_allowed(self.model())
    }

    /// Send one prompt + image and return the model's text.
    ///
    /// # Errors
    ///
    /// Returns a [`VisionError`] if every attempt fails or billing is detected.
    async fn generate(&self, prompt: &str, image: &ImagePart) -> Result<VisionReply, VisionError>;
}

// =============================================================================
// BILLING HEADERS
// =============================================================================

/// Response headers that indicate a call was charged.
pub const BILLING_HEADERS: [&str; 3] = ["x-billing-charged", "x-cost", "x-usage-cost"];

/// Return the first billing header present in `headers`, if any.
#[must_use]
pub fn billing_header(headers: &HeaderMap) -> Option<&'static str> {
    BILLING_HEADERS
        .into_iter()
        .find(|name| headers.contains_key(*name))
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
