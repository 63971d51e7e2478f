//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the JSON API, the WhatsApp webhook, the match-changed websocket and
//! the payment parser endpoints under a single Axum router.

pub mod ai;
pub mod events;
pub mod matches;
pub mod messages;
pub mod payments;
pub mod players;
pub mod settings;
pub mod squad;
pub mod users;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::screenshot::MAX_FILE_BYTES;
use crate::state::AppState;

/// Body limit for routes that carry a base64 screenshot: the encoded image
/// plus room for the JSON envelope.
pub const SCREENSHOT_BODY_LIMIT: usize = MAX_FILE_BYTES.div_ceil(3) * 4 + 64 * 1024;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(ai::root))
        .route("/health", get(ai::health))
        .route("/status", get(ai::status))
        .route(
            "/parse-payment",
            post(ai::parse_payment).layer(DefaultBodyLimit::max(SCREENSHOT_BODY_LIMIT)),
        )
        .route("/healthz", get(healthz))
        .route("/api/matches", get(matches::list).post(matches::create))
        .route(
            "/api/matches/{id}",
            get(matches::get).patch(matches::update).delete(matches::delete),
        )
        .route("/api/matches/{id}/squad", get(squad::list).post(squad::add))
        .route("/api/matches/{id}/squad/summary", get(squad::summary))
        .route("/api/matches/{id}/squad/remind", post(squad::remind))
        .route(
            "/api/matches/{id}/squad/{player_id}",
            put(squad::set_availability).delete(squad::remove),
        )
        .route(
            "/api/matches/{id}/payments",
            get(payments::list)
                .post(payments::record)
                .layer(DefaultBodyLimit::max(SCREENSHOT_BODY_LIMIT)),
        )
        .route("/api/matches/{id}/reconciliation", get(payments::reconciliation))
        .route("/api/payments/dashboard", get(payments::dashboard))
        .route(
            "/api/payments/{id}",
            get(payments::get).patch(payments::update).delete(payments::delete),
        )
        .route("/api/players", get(players::list).post(players::create))
        .route(
            "/api/players/{id}",
            get(players::get).patch(players::update).delete(players::deactivate),
        )
        .route("/api/players/{id}/payments", get(players::payments))
        .route("/api/players/{id}/messages", get(messages::thread).post(messages::send))
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/users/{id}", axum::routing::delete(users::delete))
        .route("/api/users/{id}/role", put(users::change_role))
        .route("/api/settings", get(settings::get).patch(settings::update))
        .route("/api/whatsapp/webhook", get(messages::verify).post(messages::receive))
        .route("/api/events", get(events::handle_ws))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
