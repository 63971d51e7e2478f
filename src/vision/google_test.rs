use super::*;
use serde_json::json;

#[test]
fn request_carries_prompt_and_inline_image() {
    let image = ImagePart::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]);
    let body = serde_json::to_value(build_request("extract", &image)).unwrap();

    let parts = &body["contents"][0]["parts"];
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(parts[0]["text"], "extract");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
    assert_eq!(parts[1]["inlineData"]["data"], "/9j/");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
}

#[test]
fn parse_joins_text_parts() {
    let raw = json!({
        "candidates": [{
            "content": { "parts": [{ "text": "{\"amount\":" }, { "text": " 500}" }], "role": "model" },
            "finishReason": "STOP"
        }]
    })
    .to_string();
    assert_eq!(parse_generate_response(&raw).unwrap(), "{\"amount\": 500}");
}

#[test]
fn parse_reports_blocked_prompt() {
    let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } }).to_string();
    let err = parse_generate_response(&raw).unwrap_err().to_string();
    assert!(err.contains("SAFETY"));
}

#[test]
fn parse_rejects_empty_candidates() {
    let raw = json!({ "candidates": [] }).to_string();
    assert!(matches!(parse_generate_response(&raw), Err(VisionError::ApiParse(_))));
}

#[test]
fn parse_rejects_empty_text() {
    let raw = json!({ "candidates": [{ "content": { "parts": [] }, "finishReason": "MAX_TOKENS" }] }).to_string();
    let err = parse_generate_response(&raw).unwrap_err().to_string();
    assert!(err.contains("MAX_TOKENS"));
}

#[test]
fn parse_rejects_invalid_json() {
    assert!(matches!(parse_generate_response("not json"), Err(VisionError::ApiParse(_))));
}
