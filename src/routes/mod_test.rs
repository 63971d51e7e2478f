use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep, timeout};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;
use crate::events::MatchEventKind;
use crate::services::payment_parser::ParserConfig;
use crate::services::screenshot::fixtures::{padded_png_base64, png_base64};
use crate::state::test_helpers::{test_app_state, test_app_state_with_vision};
use crate::vision::{ImagePart, VisionError, VisionModel, VisionReply};

struct FixedVision(&'static str);

#[async_trait::async_trait]
impl VisionModel for FixedVision {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "gemini-2.0-flash"
    }

    async fn generate(&self, _prompt: &str, _image: &ImagePart) -> Result<VisionReply, VisionError> {
        Ok(VisionReply { text: self.0.to_string(), model: "gemini-2.0-flash".into() })
    }
}

async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

// =============================================================================
// PARSER ENDPOINTS
// =============================================================================

#[tokio::test]
async fn healthz_is_ok() {
    let (status, _) = call(app(test_app_state()), Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_parser_state() {
    let (status, body) = call(app(test_app_state()), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "ai-service");

    let disabled = ParserConfig { enabled: false, ..ParserConfig::default() };
    let state = test_app_state_with_vision(Arc::new(FixedVision("{}")), &disabled);
    let (_, body) = call(app(state.clone()), Method::GET, "/health", None).await;
    assert_eq!(body["status"], "unhealthy");
    let (_, body) = call(app(state), Method::GET, "/", None).await;
    assert_eq!(body["status"], "disabled");
    assert_eq!(body["endpoints"]["parse"], "/parse-payment");
}

#[tokio::test]
async fn status_counts_requests() {
    let config = ParserConfig { daily_limit: 5, ..ParserConfig::default() };
    let state = test_app_state_with_vision(Arc::new(FixedVision(r#"{"is_payment_screenshot": false, "detected_type": "meme"}"#)), &config);

    let (_, before) = call(app(state.clone()), Method::GET, "/status", None).await;
    assert_eq!(before["requests_today"], 0);
    assert_eq!(before["daily_limit"], 5);

    let req = json!({ "image_base64": png_base64(1080, 2400) });
    let (status, body) = call(app(state.clone()), Method::POST, "/parse-payment", Some(req)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "not_payment_screenshot");

    let (_, after) = call(app(state), Method::GET, "/status", None).await;
    assert_eq!(after["requests_today"], 1);
    assert_eq!(after["requests_remaining"], 4);
}

#[tokio::test]
async fn parse_payment_returns_contract_on_success() {
    let reply = r#"```json
{"is_payment_screenshot": true, "amount": "₹450.00", "currency": "INR", "date": "2024-01-16",
 "transaction_status": "completed", "transaction_id": "412345678901", "payment_method": "UPI",
 "confidence": 0.95}
```"#;
    let state = test_app_state_with_vision(Arc::new(FixedVision(reply)), &ParserConfig::default());
    let req = json!({ "image_base64": png_base64(1080, 2400), "match_date": "2024-01-14" });
    let (status, body) = call(app(state), Method::POST, "/parse-payment", Some(req)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["amount"], 450.0);
    assert_eq!(body["metadata"]["requires_review"], false);
    assert_eq!(body["metadata"]["model_cost_tier"], "free");
}

#[tokio::test]
async fn parse_payment_without_provider_is_a_service_error() {
    let req = json!({ "image_base64": png_base64(1080, 2400) });
    let (status, body) = call(app(test_app_state()), Method::POST, "/parse-payment", Some(req)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_code"], "service_error");
}

#[tokio::test]
async fn full_size_screenshot_reaches_the_parser() {
    let reply = r#"{"is_payment_screenshot": true, "amount": 450, "date": "2024-01-16", "confidence": 0.9}"#;
    let state = test_app_state_with_vision(Arc::new(FixedVision(reply)), &ParserConfig::default());
    let image = padded_png_base64(1080, 2400, 3 * 1024 * 1024);
    assert!(image.len() > 2 * 1024 * 1024);

    let (status, body) = call(app(state), Method::POST, "/parse-payment", Some(json!({ "image_base64": image }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["amount"], 450.0);
}

#[tokio::test]
async fn body_beyond_screenshot_limit_is_rejected() {
    let image = "A".repeat(SCREENSHOT_BODY_LIMIT + 1);
    let (status, _) =
        call(app(test_app_state()), Method::POST, "/parse-payment", Some(json!({ "image_base64": image }))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// VALIDATION BEFORE STORAGE
// =============================================================================

#[tokio::test]
async fn bad_phone_is_unprocessable() {
    let req = json!({ "name": "Ravi", "phone": "12ab" });
    let (status, body) = call(app(test_app_state()), Method::POST, "/api/players", Some(req)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "E_INVALID");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn empty_squad_add_is_unprocessable() {
    let uri = format!("/api/matches/{}/squad", Uuid::new_v4());
    let (status, body) = call(app(test_app_state()), Method::POST, &uri, Some(json!({ "player_ids": [] }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "E_INVALID");
}

#[tokio::test]
async fn payment_without_amount_is_unprocessable() {
    let uri = format!("/api/matches/{}/payments", Uuid::new_v4());
    let req = json!({ "player_id": Uuid::new_v4(), "amount_paise": 0 });
    let (status, _) = call(app(test_app_state()), Method::POST, &uri, Some(req)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_id_is_rejected() {
    let (status, _) = call(app(test_app_state()), Method::GET, "/api/matches/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// WEBHOOK
// =============================================================================

#[tokio::test]
async fn webhook_verify_echoes_challenge() {
    let state = test_app_state().with_verify_token(Some("s3cret".into()));
    let uri = "/api/whatsapp/webhook?hub.mode=subscribe&hub.verify_token=s3cret&hub.challenge=1158201444";
    let (status, body) = call(app(state.clone()), Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(1_158_201_444));

    let uri = "/api/whatsapp/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1";
    let (status, _) = call(app(state), Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_without_messages_is_acknowledged() {
    let payload = json!({
        "object": "whatsapp_business_account",
        "entry": [{ "changes": [{ "value": { "statuses": [{ "id": "wamid.1", "status": "delivered" }] } }] }]
    });
    let (status, body) = call(app(test_app_state()), Method::POST, "/api/whatsapp/webhook", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored"], 0);
}

// =============================================================================
// EVENT STREAM
// =============================================================================

#[tokio::test]
async fn event_stream_forwards_match_events() {
    let state = test_app_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/events")).await.unwrap();
    timeout(Duration::from_secs(2), async {
        while state.events.subscriber_count() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber should register");

    let match_id = Uuid::new_v4();
    state.events.publish(match_id, MatchEventKind::SquadChanged);

    let msg = timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("event should arrive")
        .unwrap()
        .unwrap();
    let event: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(event["match_id"], match_id.to_string());
    assert_eq!(event["kind"], "squad_changed");

    server.abort();
}
