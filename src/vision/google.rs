//! Google AI Studio (Gemini / Gemma) REST client.
//!
//! Calls `models/{model}:generateContent` with the prompt and the image as
//! inline data. Low temperature keeps extraction deterministic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::VisionTimeouts;
use super::types::{ImagePart, VisionError, billing_header};

const TEMPERATURE: f32 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 1024;

pub struct GoogleAiStudioClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleAiStudioClient {
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

    /// Run one generation against `model` and return the response text.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-200 status, billing
    /// headers, or an empty/blocked response.
    pub async fn generate(&self, model: &str, prompt: &str, image: &ImagePart) -> Result<String, VisionError> {
        let body = build_request(prompt, image);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
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
        parse_generate_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

fn build_request<'a>(prompt: &'a str, image: &ImagePart) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![RequestContent {
            role: "user",
            parts: vec![
                RequestPart::Text { text: prompt },
                RequestPart::Inline { inline_data: InlineData { mime_type: image.mime_type, data: image.base64() } },
            ],
        }],
        generation_config: GenerationConfig { temperature: TEMPERATURE, max_output_tokens: MAX_OUTPUT_TOKENS },
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Concatenate the text parts of the first candidate.
fn parse_generate_response(text: &str) -> Result<String, VisionError> {
    let resp: GenerateResponse = serde_json::from_str(text).map_err(|e| VisionError::ApiParse(e.to_string()))?;

    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(VisionError::ApiParse(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = resp.candidates.into_iter().next() else {
        return Err(VisionError::ApiParse("response has no candidates".into()));
    };
    let joined: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if joined.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(VisionError::ApiParse(format!("empty response (finish reason {reason})")));
    }
    Ok(joined)
}

#[cfg(test)]
#[path = "google_test.rs"]
mod tests;
