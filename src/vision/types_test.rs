use super::*;
use crate::error::ErrorCode;
use reqwest::header::{HeaderName, HeaderValue};

#[test]
fn billing_header_detects_known_names() {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_bytes(b"X-Cost").unwrap(), HeaderValue::from_static("0.002"));
    assert_eq!(billing_header(&headers), Some("x-cost"));
}

#[test]
fn billing_header_ignores_unrelated_headers() {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("x-request-id", HeaderValue::from_static("abc"));
    assert_eq!(billing_header(&headers), None);
}

#[test]
fn data_url_embeds_mime_and_base64() {
    let part = ImagePart::new("image/png", vec![0x89, b'P', b'N', b'G']);
    assert_eq!(part.data_url(), "data:image/png;base64,iVBORw==");
}

#[test]
fn retryable_only_for_transient_failures() {
    assert!(VisionError::ApiRequest("timeout".into()).retryable());
    assert!(VisionError::ApiResponse { status: 503, body: String::new() }.retryable());
    assert!(VisionError::ApiResponse { status: 429, body: String::new() }.retryable());
    assert!(!VisionError::ApiResponse { status: 400, body: String::new() }.retryable());
    assert!(!VisionError::NoAllowedModel.retryable());
}

#[test]
fn error_codes_are_stable() {
    let err = VisionError::BillingDetected { model: "m".into(), header: "x-cost" };
    assert_eq!(err.error_code(), "E_BILLING_DETECTED");
    assert!(err.to_string().contains("x-cost"));
    assert_eq!(VisionError::AllModelsFailed { last: "boom".into() }.error_code(), "E_ALL_MODELS_FAILED");
}
