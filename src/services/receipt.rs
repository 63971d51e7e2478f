//! Payment receipt contract shared with the UI, plus model-output parsing.
//!
//! DESIGN
//! ======
//! The response shape is fixed: every field is always present, with empty
//! strings and zeroes standing in for missing values. Only values change
//! between responses. Model output is treated as untrusted text: fences are
//! stripped, numbers may arrive as strings, and enum-like fields are
//! normalised to their allowed values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// ENUMS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
    Pending,
    #[default]
    Unknown,
}

impl TransactionStatus {
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "completed" | "success" | "successful" | "done" => Self::Completed,
            "failed" | "failure" | "rejected" => Self::Failed,
            "pending" | "processing" | "in progress" => Self::Pending,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "UPI")]
    Upi,
    #[serde(rename = "NEFT")]
    Neft,
    #[serde(rename = "IMPS")]
    Imps,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl PaymentMethod {
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "UPI" | "BHIM" | "GPAY" | "PHONEPE" | "PAYTM" => Self::Upi,
            "NEFT" => Self::Neft,
            "IMPS" => Self::Imps,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upi => "UPI",
            Self::Neft => "NEFT",
            Self::Imps => "IMPS",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Paid,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorCode {
    NotPaymentScreenshot,
    PaymentDateInvalid,
    AiFailed,
    ValidationFailed,
    ServiceDisabled,
    ServiceError,
    DailyLimitExceeded,
    ModelNotFree,
    InvalidImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    LowConfidence,
    DateMismatch,
    AiUncertain,
    NotPaymentScreenshot,
    ValidationFailed,
    ServiceError,
    ServiceDisabled,
    DailyLimitExceeded,
    ModelNotFree,
}

impl ParseErrorCode {
    /// Review reason recorded alongside a failed parse.
    #[must_use]
    pub fn review_reason(self) -> ReviewReason {
        match self {
            Self::AiFailed => ReviewReason::AiUncertain,
            Self::InvalidImage | Self::ValidationFailed => ReviewReason::ValidationFailed,
            Self::PaymentDateInvalid => ReviewReason::DateMismatch,
            Self::NotPaymentScreenshot => ReviewReason::NotPaymentScreenshot,
            Self::ServiceError => ReviewReason::ServiceError,
            Self::ServiceDisabled | Self::DailyLimitExceeded | Self::ModelNotFree => ReviewReason::ServiceDisabled,
        }
    }
}

impl From<crate::quota::BlockReason> for ParseErrorCode {
    fn from(reason: crate::quota::BlockReason) -> Self {
        match reason {
            crate::quota::BlockReason::ServiceDisabled => Self::ServiceDisabled,
            crate::quota::BlockReason::ModelNotFree => Self::ModelNotFree,
            crate::quota::BlockReason::DailyLimitExceeded => Self::DailyLimitExceeded,
        }
    }
}

// =============================================================================
// CONTRACT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    pub amount: f64,
    pub currency: String,
    pub payer_name: String,
    pub payee_name: String,
    /// `YYYY-MM-DD` or empty.
    pub date: String,
    /// `HH:MM:SS` or empty.
    pub time: String,
    pub transaction_status: TransactionStatus,
    pub transaction_id: String,
    pub payment_method: PaymentMethod,
    pub upi_id: String,
}

impl Default for PaymentData {
    fn default() -> Self {
        Self {
            amount: 0.0,
            currency: "INR".into(),
            payer_name: String::new(),
            payee_name: String::new(),
            date: String::new(),
            time: String::new(),
            transaction_status: TransactionStatus::Unknown,
            transaction_id: String::new(),
            payment_method: PaymentMethod::Unknown,
            upi_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub confidence: f64,
    pub is_payment_screenshot: bool,
    pub processing_time_ms: u64,
    pub provider: String,
    pub model: String,
    pub model_cost_tier: CostTier,
    pub image_hash: String,
    pub requires_review: bool,
    pub review_reason: Option<ReviewReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsePaymentResponse {
    pub success: bool,
    pub error_code: Option<ParseErrorCode>,
    pub error_message: Option<String>,
    pub data: PaymentData,
    pub metadata: ResponseMetadata,
}

// =============================================================================
// MODEL OUTPUT
// =============================================================================

/// What the model reported, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub is_payment_screenshot: bool,
    pub detected_type: String,
    pub confidence: f64,
    pub data: PaymentData,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("JSON parse error: {0}")]
pub struct ExtractionParseError(pub String);

/// Remove surrounding markdown code fences.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();
    if s.starts_with("```") {
        s = s.split_once('\n').map_or("", |(_, rest)| rest);
    }
    if let Some(stripped) = s.trim_end().strip_suffix("```") {
        s = stripped;
    }
    s.trim()
}

fn json_object(text: &str) -> Result<serde_json::Map<String, Value>, ExtractionParseError> {
    let body = strip_code_fences(text);
    let parsed = serde_json::from_str::<Value>(body).or_else(|first_err| {
        // Tolerate prose around the object.
        match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<Value>(&body[start..=end]).map_err(|_| first_err)
            }
            _ => Err(first_err),
        }
    });
    match parsed {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ExtractionParseError(format!("expected object, got {other}"))),
        Err(e) => Err(ExtractionParseError(e.to_string())),
    }
}

/// Read a number that may be encoded as a string like `"₹1,250.00"`.
#[must_use]
pub fn loose_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

fn loose_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn loose_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Parse raw model text into an [`Extraction`].
///
/// # Errors
///
/// Returns an error when no JSON object can be recovered from the text.
pub fn parse_extraction(text: &str) -> Result<Extraction, ExtractionParseError> {
    let map = json_object(text)?;
    let currency = loose_string(map.get("currency"));
    let data = PaymentData {
        amount: loose_number(map.get("amount")),
        currency: if currency.is_empty() { "INR".into() } else { currency },
        payer_name: loose_string(map.get("payer_name")),
        payee_name: loose_string(map.get("payee_name")),
        date: loose_string(map.get("date")),
        time: loose_string(map.get("time")),
        transaction_status: TransactionStatus::normalize(&loose_string(map.get("transaction_status"))),
        transaction_id: loose_string(map.get("transaction_id")),
        payment_method: PaymentMethod::normalize(&loose_string(map.get("payment_method"))),
        upi_id: loose_string(map.get("upi_id")),
    };
    Ok(Extraction {
        is_payment_screenshot: loose_bool(map.get("is_payment_screenshot")),
        detected_type: loose_string(map.get("detected_type")),
        confidence: loose_number(map.get("confidence")).clamp(0.0, 1.0),
        data,
    })
}

/// Prompt sent with every screenshot.
pub const EXTRACTION_PROMPT: &str = r#"You are analyzing an image. First determine if this is a UPI/bank payment screenshot.

If this is NOT a payment screenshot (e.g., selfie, document, random image, chat screenshot), respond with ONLY this JSON:
{"is_payment_screenshot": false, "detected_type": "describe what the image is"}

If this IS a payment screenshot, extract the following information and respond with ONLY valid JSON (no markdown, no explanation):
{
    "is_payment_screenshot": true,
    "amount": <number - the payment amount, use 0 if not found>,
    "currency": "INR",
    "payer_name": "<string - name of person who paid, empty string if not found>",
    "payee_name": "<string - name of recipient, empty string if not found>",
    "date": "<string in YYYY-MM-DD format, empty string if not found>",
    "time": "<string in HH:MM:SS format, empty string if not found>",
    "transaction_status": "<completed|failed|pending|unknown>",
    "transaction_id": "<string - UPI ref or transaction ID, empty string if not found>",
    "payment_method": "<UPI|NEFT|IMPS|unknown>",
    "upi_id": "<string - UPI ID if visible, empty string if not found>",
    "confidence": <number between 0 and 1 indicating how confident you are>
}

Rules:
1. Return ONLY the JSON object, no other text
2. All string fields are empty strings "" when not found, never null
3. Amount is 0 when not clearly visible
4. Date uses YYYY-MM-DD
5. Time uses HH:MM:SS (00:00:00 when only the date is visible)
6. Be conservative with confidence; lower it when anything is unclear"#;

#[cfg(test)]
#[path = "receipt_test.rs"]
mod tests;
