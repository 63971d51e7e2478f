use super::*;
use crate::config::map_lookup;
use crate::error::ErrorCode;
use serde_json::json;

#[test]
fn config_requires_token_and_phone_id() {
    assert!(WhatsAppConfig::from_lookup(&map_lookup(&[("WHATSAPP_ACCESS_TOKEN", "t")])).is_none());
    let cfg = WhatsAppConfig::from_lookup(&map_lookup(&[
        ("WHATSAPP_ACCESS_TOKEN", "t"),
        ("WHATSAPP_PHONE_NUMBER_ID", "123"),
    ]))
    .unwrap();
    assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
}

#[test]
fn config_trims_base_url() {
    let cfg = WhatsAppConfig::from_lookup(&map_lookup(&[
        ("WHATSAPP_ACCESS_TOKEN", "t"),
        ("WHATSAPP_PHONE_NUMBER_ID", "123"),
        ("WHATSAPP_API_BASE_URL", "http://localhost:9000/"),
    ]))
    .unwrap();
    let client = CloudApiClient::new(cfg).unwrap();
    assert_eq!(client.messages_url(), "http://localhost:9000/123/messages");
}

#[test]
fn text_request_shape() {
    assert_eq!(
        build_text_request("+919876543210", "Are you in for Sunday?"),
        json!({
            "messaging_product": "whatsapp",
            "to": "919876543210",
            "type": "text",
            "text": {"body": "Are you in for Sunday?"}
        })
    );
}

#[test]
fn send_response_yields_first_id() {
    let text = r#"{"messaging_product":"whatsapp","contacts":[{"wa_id":"91"}],"messages":[{"id":"wamid.ABC"}]}"#;
    assert_eq!(parse_send_response(text).unwrap(), "wamid.ABC");
    assert!(matches!(parse_send_response(r#"{"messages":[]}"#), Err(WhatsAppError::ApiParse(_))));
    assert!(matches!(parse_send_response("nope"), Err(WhatsAppError::ApiParse(_))));
}

#[test]
fn verification_handshake() {
    let params = VerifyParams {
        mode: Some("subscribe".into()),
        verify_token: Some("secret".into()),
        challenge: Some("12345".into()),
    };
    assert_eq!(verify_subscription(&params, Some("secret")), Some("12345"));
    assert_eq!(verify_subscription(&params, Some("other")), None);
    assert_eq!(verify_subscription(&params, None), None);

    let wrong_mode = VerifyParams { mode: Some("unsubscribe".into()), ..params };
    assert_eq!(verify_subscription(&wrong_mode, Some("secret")), None);
}

#[test]
fn webhook_keeps_only_text_messages() {
    let payload: WebhookPayload = serde_json::from_value(json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "messages": [
                        {"from": "919876543210", "id": "wamid.1", "timestamp": "1705400000", "type": "text", "text": {"body": "yes I'm in"}},
                        {"from": "919876543210", "id": "wamid.2", "timestamp": "1705400001", "type": "image", "image": {"id": "media"}}
                    ]
                }
            }, {
                "field": "messages",
                "value": {"statuses": [{"id": "wamid.0", "status": "delivered"}]}
            }]
        }]
    }))
    .unwrap();

    let texts = payload.inbound_texts();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].from, "919876543210");
    assert_eq!(texts[0].body, "yes I'm in");
    assert_eq!(texts[0].provider_message_id, "wamid.1");
    assert_eq!(texts[0].timestamp, Some(1_705_400_000));
}

#[test]
fn error_statuses() {
    assert_eq!(WhatsAppError::NotConfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(WhatsAppError::Disabled.error_code(), "E_WHATSAPP_DISABLED");
    assert!(WhatsAppError::ApiResponse { status: 503, body: String::new() }.retryable());
    assert!(!WhatsAppError::ApiResponse { status: 400, body: String::new() }.retryable());
}

#[tokio::test]
async fn unreachable_api_is_request_error() {
    let client = CloudApiClient::new(WhatsAppConfig {
        access_token: "t".into(),
        phone_number_id: "1".into(),
        api_base_url: "http://127.0.0.1:9".into(),
    })
    .unwrap();
    let err = client.send_text("91", "hi").await.unwrap_err();
    assert!(matches!(err, WhatsAppError::ApiRequest(_)));
}
