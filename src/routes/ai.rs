//! Payment parser endpoints.
//!
//! `/parse-payment` always answers 200 with the parse contract; failures are
//! carried in `success`/`error_code`, never as HTTP errors.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::services::payment_parser::ServiceStatus;
use crate::services::receipt::ParsePaymentResponse;
use crate::state::AppState;

pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct ParsePaymentRequest {
    pub image_base64: String,
    #[serde(default)]
    pub match_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
}

/// `GET /health`: liveness check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.parser.is_enabled() { "healthy" } else { "unhealthy" },
        service: "ai-service",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `GET /status`: configuration and today's usage.
pub async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.parser.status())
}

/// `POST /parse-payment`: parse one screenshot.
pub async fn parse_payment(
    State(state): State<AppState>,
    Json(body): Json<ParsePaymentRequest>,
) -> Json<ParsePaymentResponse> {
    tracing::info!(match_date = body.match_date.as_deref().unwrap_or(""), "parse-payment request");
    Json(state.parser.parse(&body.image_base64, body.match_date.as_deref()).await)
}

/// `GET /`: service info.
pub async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "ai-payment-parser",
        "version": SERVICE_VERSION,
        "status": if state.parser.is_enabled() { "running" } else { "disabled" },
        "endpoints": {
            "health": "/health",
            "status": "/status",
            "parse": "/parse-payment"
        }
    }))
}
