//! WhatsApp Cloud API: outbound text messages and webhook payloads.
//!
//! DESIGN
//! ======
//! Sending goes through the [`WhatsAppSend`] trait so message services and
//! squad reminders can be tested with a recording mock. The concrete
//! [`CloudApiClient`] posts to `{base}/{phone_number_id}/messages` with a
//! bearer token. Webhook deliveries are flattened into [`InboundText`] values;
//! non-text messages and status callbacks are skipped.

use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{Lookup, env_lookup, non_empty};

pub const DEFAULT_API_BASE_URL: &str = "https://graph.facebook.com/v19.0";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    #[error("whatsapp is not configured")]
    NotConfigured,
    #[error("whatsapp messaging is disabled in settings")]
    Disabled,
    #[error("whatsapp request failed: {0}")]
    ApiRequest(String),
    #[error("whatsapp API error: status {status}")]
    ApiResponse { status: u16, body: String },
    #[error("whatsapp response parse failed: {0}")]
    ApiParse(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::error::ErrorCode for WhatsAppError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_WHATSAPP_NOT_CONFIGURED",
            Self::Disabled => "E_WHATSAPP_DISABLED",
            Self::ApiRequest(_) => "E_WHATSAPP_REQUEST",
            Self::ApiResponse { .. } => "E_WHATSAPP_RESPONSE",
            Self::ApiParse(_) => "E_WHATSAPP_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured | Self::Disabled | Self::HttpClientBuild(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_number_id: String,
    pub api_base_url: String,
}

impl WhatsAppConfig {
    /// Read sender credentials. Returns `None` unless both the token and the
    /// phone number id are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(&env_lookup)
    }

    #[must_use]
    pub fn from_lookup(lookup: Lookup<'_>) -> Option<Self> {
        let access_token = non_empty(lookup, "WHATSAPP_ACCESS_TOKEN")?;
        let phone_number_id = non_empty(lookup, "WHATSAPP_PHONE_NUMBER_ID")?;
        let api_base_url = non_empty(lookup, "WHATSAPP_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Some(Self { access_token, phone_number_id, api_base_url })
    }
}

/// Webhook verification token, if configured.
#[must_use]
pub fn verify_token_from_lookup(lookup: Lookup<'_>) -> Option<String> {
    non_empty(lookup, "WHATSAPP_VERIFY_TOKEN")
}

// =============================================================================
// SENDER
// =============================================================================

#[async_trait::async_trait]
pub trait WhatsAppSend: Send + Sync {
    /// Send a text message. Returns the provider message id.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, WhatsAppError>;
}

pub struct CloudApiClient {
    http: reqwest::Client,
    config: WhatsAppConfig,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

impl CloudApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: WhatsAppConfig) -> Result<Self, WhatsAppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| WhatsAppError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.config.api_base_url, self.config.phone_number_id)
    }
}

/// Build the Cloud API payload for a plain text message.
#[must_use]
pub fn build_text_request(to: &str, body: &str) -> serde_json::Value {
    serde_json::to_value(SendRequest {
        messaging_product: "whatsapp",
        to: to.trim_start_matches('+'),
        kind: "text",
        text: TextBody { body },
    })
    .unwrap_or_default()
}

/// Extract the first message id from a send response.
///
/// # Errors
///
/// Returns an error if the body is not valid JSON or carries no message id.
pub fn parse_send_response(text: &str) -> Result<String, WhatsAppError> {
    let resp: SendResponse = serde_json::from_str(text).map_err(|e| WhatsAppError::ApiParse(e.to_string()))?;
    resp.messages
        .into_iter()
        .next()
        .map(|m| m.id)
        .ok_or_else(|| WhatsAppError::ApiParse("response carried no message id".into()))
}

#[async_trait::async_trait]
impl WhatsAppSend for CloudApiClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, WhatsAppError> {
        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&build_text_request(to, body))
            .send()
            .await
            .map_err(|e| WhatsAppError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| WhatsAppError::ApiRequest(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(WhatsAppError::ApiResponse { status, body: text });
        }
        parse_send_response(&text)
    }
}

// =============================================================================
// WEBHOOK
// =============================================================================

/// Query parameters of the webhook verification handshake.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo when the handshake is valid.
#[must_use]
pub fn verify_subscription<'a>(params: &'a VerifyParams, expected: Option<&str>) -> Option<&'a str> {
    let expected = expected?;
    if params.mode.as_deref() != Some("subscribe") || params.verify_token.as_deref() != Some(expected) {
        return None;
    }
    params.challenge.as_deref()
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: WebhookValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<WebhookText>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

/// One inbound text message from a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    pub from: String,
    pub body: String,
    pub provider_message_id: String,
    /// Unix seconds reported by WhatsApp.
    pub timestamp: Option<i64>,
}

impl WebhookPayload {
    #[must_use]
    pub fn inbound_texts(&self) -> Vec<InboundText> {
        self.entry
            .iter()
            .flat_map(|e| &e.changes)
            .flat_map(|c| &c.value.messages)
            .filter(|m| m.kind == "text")
            .filter_map(|m| {
                let body = m.text.as_ref()?.body.clone();
                Some(InboundText {
                    from: m.from.clone(),
                    body,
                    provider_message_id: m.id.clone(),
                    timestamp: m.timestamp.as_deref().and_then(|t| t.parse().ok()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "whatsapp_test.rs"]
mod tests;
