use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::config::map_lookup;
use crate::services::screenshot::fixtures::png_base64;
use crate::vision::VisionReply;

// =============================================================================
// TEST DOUBLES
// =============================================================================

struct MockVision {
    model: &'static str,
    reply: Mutex<Option<Result<String, VisionError>>>,
    calls: AtomicUsize,
}

impl MockVision {
    fn replying(text: &str) -> Arc<Self> {
        Self::with(Ok(text.to_string()))
    }

    fn with(result: Result<String, VisionError>) -> Arc<Self> {
        Arc::new(Self { model: "gemini-2.0-flash", reply: Mutex::new(Some(result)), calls: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl VisionModel for MockVision {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        self.model
    }

    async fn generate(&self, _prompt: &str, image: &ImagePart) -> Result<VisionReply, VisionError> {
        assert_eq!(image.mime_type, "image/png");
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.reply.lock().unwrap().take().unwrap_or_else(|| Err(VisionError::NoAllowedModel));
        next.map(|text| VisionReply { text, model: self.model.to_string() })
    }
}

const GOOD_RECEIPT: &str = r#"{
    "is_payment_screenshot": true,
    "amount": 450,
    "currency": "INR",
    "payer_name": "Rahul S",
    "payee_name": "Cricket Club",
    "date": "2024-01-16",
    "time": "19:04:11",
    "transaction_status": "completed",
    "transaction_id": "412345678901",
    "payment_method": "UPI",
    "upi_id": "club@okaxis",
    "confidence": 0.92
}"#;

fn parser_with(config: &ParserConfig, mock: &Arc<MockVision>) -> PaymentParser {
    let vision: Arc<dyn VisionModel> = mock.clone();
    PaymentParser::new(config, Some(vision))
}

fn parser(mock: &Arc<MockVision>) -> PaymentParser {
    parser_with(&ParserConfig::default(), mock)
}

fn screenshot() -> String {
    png_base64(1080, 2400)
}

// =============================================================================
// CONFIG
// =============================================================================

#[test]
fn config_defaults() {
    let cfg = ParserConfig::from_lookup(&map_lookup(&[]));
    assert_eq!(cfg, ParserConfig::default());
}

#[test]
fn config_reads_overrides() {
    let lookup = map_lookup(&[
        ("AI_SERVICE_ENABLED", "false"),
        ("AI_PROVIDER", "openrouter"),
        ("DAILY_REQUEST_LIMIT", "25"),
        ("MIN_CONFIDENCE_THRESHOLD", "0.5"),
    ]);
    let cfg = ParserConfig::from_lookup(&lookup);
    assert!(!cfg.enabled);
    assert_eq!(cfg.provider, "openrouter");
    assert_eq!(cfg.daily_limit, 25);
    assert!((cfg.min_confidence - 0.5).abs() < f64::EPSILON);
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[tokio::test]
async fn parses_clean_receipt() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let parser = parser(&mock);
    let res = parser.parse(&screenshot(), Some("2024-01-15T00:00:00Z")).await;

    assert!(res.success, "{res:?}");
    assert!(res.error_code.is_none());
    assert!((res.data.amount - 450.0).abs() < f64::EPSILON);
    assert_eq!(res.data.payer_name, "Rahul S");
    assert!(res.metadata.is_payment_screenshot);
    assert!(!res.metadata.requires_review);
    assert!(res.metadata.review_reason.is_none());
    assert_eq!(res.metadata.provider, "mock");
    assert_eq!(res.metadata.model, "gemini-2.0-flash");
    assert_eq!(res.metadata.model_cost_tier, CostTier::Free);
    assert_eq!(res.metadata.image_hash.len(), 64);
    assert_eq!(parser.status().requests_today, 1);
}

#[tokio::test]
async fn same_image_hashes_identically() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let parser = parser(&mock);
    let a = parser.parse(&screenshot(), None).await;
    let b = parser.parse(&format!("data:image/png;base64,{}", screenshot()), None).await;
    assert_eq!(a.metadata.image_hash, b.metadata.image_hash);
}

// =============================================================================
// REVIEW FLAGS
// =============================================================================

#[tokio::test]
async fn low_confidence_flags_review() {
    let text = GOOD_RECEIPT.replace("0.92", "0.4");
    let parser = parser(&MockVision::replying(&text));
    let res = parser.parse(&screenshot(), None).await;
    assert!(res.success);
    assert!(res.metadata.requires_review);
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::LowConfidence));
}

#[tokio::test]
async fn payment_before_match_is_date_mismatch() {
    let parser = parser(&MockVision::replying(GOOD_RECEIPT));
    let res = parser.parse(&screenshot(), Some("2024-02-01")).await;
    assert!(res.success);
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::DateMismatch));
}

#[tokio::test]
async fn date_mismatch_wins_over_low_confidence() {
    let text = GOOD_RECEIPT.replace("0.92", "0.3");
    let parser = parser(&MockVision::replying(&text));
    let res = parser.parse(&screenshot(), Some("2024-02-01")).await;
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::DateMismatch));
}

#[tokio::test]
async fn zero_amount_needs_review() {
    let text = GOOD_RECEIPT.replace("\"amount\": 450", "\"amount\": 0");
    let parser = parser(&MockVision::replying(&text));
    let res = parser.parse(&screenshot(), None).await;
    assert!(res.success);
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::ValidationFailed));
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn kill_switch_blocks_before_model_call() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let config = ParserConfig { enabled: false, ..ParserConfig::default() };
    let parser = parser_with(&config, &mock);
    let res = parser.parse(&screenshot(), None).await;

    assert!(!res.success);
    assert_eq!(res.error_code, Some(ParseErrorCode::ServiceDisabled));
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::ServiceDisabled));
    assert!(res.metadata.requires_review);
    assert!(!res.metadata.image_hash.is_empty());
    assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn daily_limit_blocks_second_call() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let config = ParserConfig { daily_limit: 1, ..ParserConfig::default() };
    let parser = parser_with(&config, &mock);

    assert!(parser.parse(&screenshot(), None).await.success);
    let res = parser.parse(&screenshot(), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::DailyLimitExceeded));
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    assert_eq!(parser.status().requests_remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_parses_share_the_last_slot() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let config = ParserConfig { daily_limit: 1, ..ParserConfig::default() };
    let parser = Arc::new(parser_with(&config, &mock));

    let handles = (0..16)
        .map(|_| {
            let parser = parser.clone();
            tokio::spawn(async move { parser.parse(&screenshot(), None).await })
        })
        .collect::<Vec<_>>();
    let mut blocked = 0;
    for handle in handles {
        if handle.await.unwrap().error_code == Some(ParseErrorCode::DailyLimitExceeded) {
            blocked += 1;
        }
    }
    assert_eq!(blocked, 15);
    assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
    assert_eq!(parser.status().requests_today, 1);
}

#[tokio::test]
async fn paid_model_is_refused() {
    let mock = Arc::new(MockVision {
        model: "gpt-4o",
        reply: Mutex::new(Some(Ok(GOOD_RECEIPT.to_string()))),
        calls: AtomicUsize::new(0),
    });
    let res = parser(&mock).parse(&screenshot(), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::ModelNotFree));
    assert_eq!(res.metadata.model_cost_tier, CostTier::Paid);
    assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bad_base64_is_invalid_image() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let res = parser(&mock).parse("%%%", None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::InvalidImage));
    assert!(res.metadata.image_hash.is_empty());
    assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tiny_image_is_invalid_and_not_counted() {
    let mock = MockVision::replying(GOOD_RECEIPT);
    let parser = parser(&mock);
    let res = parser.parse(&png_base64(40, 40), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::InvalidImage));
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::ValidationFailed));
    assert_eq!(parser.status().requests_today, 0);
}

#[tokio::test]
async fn non_payment_image_reports_detected_type() {
    let mock = MockVision::replying(r#"{"is_payment_screenshot": false, "detected_type": "team selfie"}"#);
    let res = parser(&mock).parse(&screenshot(), None).await;
    assert!(!res.success);
    assert_eq!(res.error_code, Some(ParseErrorCode::NotPaymentScreenshot));
    assert_eq!(
        res.error_message.as_deref(),
        Some("Image is not a payment screenshot. Detected: team selfie")
    );
    assert!(!res.metadata.is_payment_screenshot);
}

#[tokio::test]
async fn garbage_model_output_is_ai_failure() {
    let res = parser(&MockVision::replying("sorry, no idea")).parse(&screenshot(), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::AiFailed));
    assert_eq!(res.metadata.review_reason, Some(ReviewReason::AiUncertain));
}

#[tokio::test]
async fn provider_error_is_ai_failure() {
    let mock = MockVision::with(Err(VisionError::ApiResponse { status: 503, body: "overloaded".into() }));
    let parser = parser(&mock);
    let res = parser.parse(&screenshot(), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::AiFailed));
    assert!(res.error_message.unwrap().starts_with("AI processing failed"));
    // Provider was reached, so the request still counts.
    assert_eq!(parser.status().requests_today, 1);
}

#[tokio::test]
async fn billing_signal_is_model_not_free() {
    let mock = MockVision::with(Err(VisionError::BillingDetected {
        model: "gemini-2.0-flash".into(),
        header: "x-cost",
    }));
    let res = parser(&mock).parse(&screenshot(), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::ModelNotFree));
}

#[tokio::test]
async fn missing_provider_is_service_error() {
    let parser = PaymentParser::new(&ParserConfig::default(), None);
    let res = parser.parse(&screenshot(), None).await;
    assert_eq!(res.error_code, Some(ParseErrorCode::ServiceError));
    assert_eq!(res.metadata.provider, "google_ai_studio");
}

#[test]
fn status_reports_config() {
    let parser = PaymentParser::new(&ParserConfig { daily_limit: 42, ..ParserConfig::default() }, None);
    let status = parser.status();
    assert!(status.enabled);
    assert_eq!(status.daily_limit, 42);
    assert_eq!(status.requests_remaining, 42);
    assert!((status.min_confidence_threshold - 0.7).abs() < f64::EPSILON);
}
