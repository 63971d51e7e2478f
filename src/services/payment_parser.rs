//! Payment parser: screenshot in, structured receipt out.
//!
//! DESIGN
//! ======
//! One call walks a fixed pipeline and stops at the first failure:
//! 1. Decode + hash the payload
//! 2. Kill switch and cost guardrails
//! 3. Image validation
//! 4. Count the request against the daily quota
//! 5. Vision model call with the extraction prompt
//! 6. Screenshot classification, amount/date/confidence checks
//!
//! ERROR HANDLING
//! ==============
//! `parse` never returns `Err`: every failure becomes a contract response
//! with `success=false`, an error code, and `requires_review=true`, so the
//! UI always renders the same shape.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Lookup, env_lookup, flag_or, non_empty, parse_or};
use crate::quota::{DEFAULT_DAILY_REQUEST_LIMIT, Guardrails, is_model_allowed};
use crate::vision::{ImagePart, VisionError, VisionModel};

use super::payment_date::{DateCheck, validate_payment_date};
use super::receipt::{
    CostTier, EXTRACTION_PROMPT, ParseErrorCode, ParsePaymentResponse, PaymentData, ResponseMetadata, ReviewReason,
    parse_extraction,
};
use super::screenshot;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub enabled: bool,
    /// Provider label reported by `/status`, even when unconfigured.
    pub provider: String,
    pub daily_limit: u32,
    pub min_confidence: f64,
}

impl ParserConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    #[must_use]
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            enabled: flag_or(lookup, "AI_SERVICE_ENABLED", true),
            provider: non_empty(lookup, "AI_PROVIDER").unwrap_or_else(|| "google_ai_studio".into()),
            daily_limit: parse_or(lookup, "DAILY_REQUEST_LIMIT", DEFAULT_DAILY_REQUEST_LIMIT),
            min_confidence: parse_or(lookup, "MIN_CONFIDENCE_THRESHOLD", DEFAULT_MIN_CONFIDENCE),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "google_ai_studio".into(),
            daily_limit: DEFAULT_DAILY_REQUEST_LIMIT,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub enabled: bool,
    pub provider: String,
    pub daily_limit: u32,
    pub requests_today: u32,
    pub requests_remaining: u32,
    pub min_confidence_threshold: f64,
}

// =============================================================================
// PARSER
// =============================================================================

pub struct PaymentParser {
    vision: Option<Arc<dyn VisionModel>>,
    guardrails: Guardrails,
    provider: String,
    min_confidence: f64,
}

/// Per-call context used to stamp metadata on every outcome.
struct Attempt {
    started: Instant,
    provider: String,
    model: String,
    tier: CostTier,
    image_hash: String,
}

impl Attempt {
    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn fail(&self, code: ParseErrorCode, message: impl Into<String>) -> ParsePaymentResponse {
        ParsePaymentResponse {
            success: false,
            error_code: Some(code),
            error_message: Some(message.into()),
            data: PaymentData::default(),
            metadata: ResponseMetadata {
                confidence: 0.0,
                is_payment_screenshot: false,
                processing_time_ms: self.elapsed_ms(),
                provider: self.provider.clone(),
                model: self.model.clone(),
                model_cost_tier: self.tier,
                image_hash: self.image_hash.clone(),
                requires_review: true,
                review_reason: Some(code.review_reason()),
            },
        }
    }
}

impl PaymentParser {
    #[must_use]
    pub fn new(config: &ParserConfig, vision: Option<Arc<dyn VisionModel>>) -> Self {
        let provider = vision
            .as_ref()
            .map_or_else(|| config.provider.clone(), |v| v.provider_name().to_string());
        Self {
            vision,
            guardrails: Guardrails::new(config.enabled, config.daily_limit),
            provider,
            min_confidence: config.min_confidence,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.guardrails.enabled()
    }

    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        let quota = self.guardrails.quota();
        ServiceStatus {
            enabled: self.guardrails.enabled(),
            provider: self.provider.clone(),
            daily_limit: quota.limit(),
            requests_today: quota.requests_today(),
            requests_remaining: quota.remaining(),
            min_confidence_threshold: self.min_confidence,
        }
    }

    /// Parse one screenshot. Always returns a contract response.
    pub async fn parse(&self, image_base64: &str, match_date: Option<&str>) -> ParsePaymentResponse {
        let response = self.parse_inner(image_base64, match_date).await;
        if response.success {
            info!(
                amount = response.data.amount,
                confidence = response.metadata.confidence,
                requires_review = response.metadata.requires_review,
                "parsed payment"
            );
        } else {
            warn!(
                code = ?response.error_code,
                message = response.error_message.as_deref().unwrap_or(""),
                "payment parse failed"
            );
        }
        response
    }

    async fn parse_inner(&self, image_base64: &str, match_date: Option<&str>) -> ParsePaymentResponse {
        let decoded = screenshot::decode_payload(image_base64);
        let mut attempt = Attempt {
            started: Instant::now(),
            provider: self.provider.clone(),
            model: String::new(),
            tier: CostTier::Unknown,
            image_hash: decoded
                .as_ref()
                .map(|bytes| screenshot::image_hash(bytes))
                .unwrap_or_default(),
        };

        if !self.guardrails.enabled() {
            return attempt.fail(ParseErrorCode::ServiceDisabled, "AI service is disabled");
        }

        let Some(vision) = self.vision.as_ref() else {
            return attempt.fail(ParseErrorCode::ServiceError, "AI provider is not configured");
        };
        attempt.model = vision.model().to_string();
        attempt.tier = if vision.is_free_tier() { CostTier::Free } else { CostTier::Paid };

        if let Some(reason) = self.guardrails.should_block(vision.model()) {
            return attempt.fail(reason.into(), format!("Request blocked: {reason}"));
        }

        let bytes = match decoded {
            Ok(bytes) => bytes,
            Err(e) => return attempt.fail(ParseErrorCode::InvalidImage, e.to_string()),
        };
        let info = match screenshot::validate(&bytes) {
            Ok(info) => info,
            Err(e) => return attempt.fail(ParseErrorCode::InvalidImage, e.to_string()),
        };

        let count = match self.guardrails.admit(vision.model()) {
            Ok(count) => count,
            Err(reason) => return attempt.fail(reason.into(), format!("Request blocked: {reason}")),
        };
        info!(request = count, limit = self.guardrails.quota().limit(), "processing screenshot");

        let image = ImagePart::new(info.format.mime_type(), bytes);
        let reply = match vision.generate(EXTRACTION_PROMPT, &image).await {
            Ok(reply) => reply,
            Err(e @ VisionError::BillingDetected { .. }) => {
                return attempt.fail(ParseErrorCode::ModelNotFree, format!("Request blocked: {e}"));
            }
            Err(e) => return attempt.fail(ParseErrorCode::AiFailed, format!("AI processing failed: {e}")),
        };
        attempt.tier = if is_model_allowed(&reply.model) { CostTier::Free } else { CostTier::Paid };
        attempt.model = reply.model;

        let extraction = match parse_extraction(&reply.text) {
            Ok(ex) => ex,
            Err(e) => return attempt.fail(ParseErrorCode::AiFailed, format!("AI processing failed: {e}")),
        };

        if !extraction.is_payment_screenshot {
            let detected = if extraction.detected_type.is_empty() { "unknown" } else { &extraction.detected_type };
            return attempt.fail(
                ParseErrorCode::NotPaymentScreenshot,
                format!("Image is not a payment screenshot. Detected: {detected}"),
            );
        }

        let mut review_reason = None;
        if extraction.data.amount <= 0.0 {
            warn!("amount is zero or negative; flagging for review");
            review_reason = Some(ReviewReason::ValidationFailed);
        }
        if let Some(match_date) = match_date {
            if validate_payment_date(&extraction.data.date, match_date) == DateCheck::Mismatch {
                review_reason = Some(ReviewReason::DateMismatch);
            }
        }
        if extraction.confidence < self.min_confidence {
            warn!(confidence = extraction.confidence, "low confidence");
            review_reason.get_or_insert(ReviewReason::LowConfidence);
        }

        ParsePaymentResponse {
            success: true,
            error_code: None,
            error_message: None,
            metadata: ResponseMetadata {
                confidence: extraction.confidence,
                is_payment_screenshot: true,
                processing_time_ms: attempt.elapsed_ms(),
                provider: attempt.provider,
                model: attempt.model,
                model_cost_tier: attempt.tier,
                image_hash: attempt.image_hash,
                requires_review: review_reason.is_some(),
                review_reason,
            },
            data: extraction.data,
        }
    }
}

#[cfg(test)]
#[path = "payment_parser_test.rs"]
mod tests;
