//! OpenRouter client over the OpenAI-compatible chat completions API.
//!
//! The image travels as a `data:` URL in an `image_url` content part.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::VisionTimeouts;
use super::types::{ImagePart, VisionError, billing_header};

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 1024;

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    /// Build a client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: String, base_url: String, timeouts: VisionTimeouts) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| VisionError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url })
    }

    /// Run one chat completion against `model` and return the message text.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-200 status, billing
    /// headers, or a response without text.
    pub async fn generate(&self, model: &str, prompt: &str, image: &ImagePart) -> Result<String, VisionError> {
        let url_part = image.data_url();
        let body = build_request(model, prompt, &url_part);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::ApiRequest(e.to_string()))?;

        if let Some(header) = billing_header(response.headers()) {
            return Err(VisionError::BillingDetected { model: model.to_string(), header });
        }

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| VisionError::ApiRequest(e.to_string()))?;
        if status != 200 {
            return Err(VisionError::ApiResponse { status, body: text });
        }
        parse_chat_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

fn build_request<'a>(model: &'a str, prompt: &'a str, data_url: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![ContentPart::Text { text: prompt }, ContentPart::ImageUrl { image_url: ImageUrl { url: data_url } }],
        }],
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn parse_chat_response(text: &str) -> Result<String, VisionError> {
    let resp: ChatResponse = serde_json::from_str(text).map_err(|e| VisionError::ApiParse(e.to_string()))?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| VisionError::ApiParse("response has no message content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_image_url_part() {
        let body = serde_json::to_value(build_request("m", "extract", "data:image/png;base64,AA==")).unwrap();
        let content = &body["messages"][0]["content"];
        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(content[0], json!({ "type": "text", "text": "extract" }));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AA==");
    }

    #[test]
    fn parse_takes_first_choice() {
        let raw = json!({ "choices": [{ "message": { "role": "assistant", "content": "{}" } }] }).to_string();
        assert_eq!(parse_chat_response(&raw).unwrap(), "{}");
    }

    #[test]
    fn parse_rejects_null_content() {
        let raw = json!({ "choices": [{ "message": { "content": null } }] }).to_string();
        assert!(parse_chat_response(&raw).is_err());
        assert!(parse_chat_response(r#"{"choices":[]}"#).is_err());
    }
}
