//! WhatsApp conversation routes and the Cloud API webhook.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::services::messages::{self, IngestReport, Message, SendMessage, Thread, ThreadQuery};
use crate::services::{players, settings};
use crate::state::AppState;
use crate::whatsapp::{VerifyParams, WebhookPayload, verify_subscription};

/// `GET /api/players/{id}/messages?after=&limit=`: polled by open chats.
pub async fn thread(
    State(state): State<AppState>,
    Path(player_id): Path<Uuid>,
    Query(query): Query<ThreadQuery>,
) -> ApiResult<Json<Thread>> {
    players::get_player(&state.pool, player_id).await?;
    let settings = settings::get_settings(&state.pool).await?;
    Ok(Json(messages::thread(&state.pool, &settings, player_id, &query).await?))
}

/// `POST /api/players/{id}/messages`
pub async fn send(
    State(state): State<AppState>,
    Path(player_id): Path<Uuid>,
    Json(body): Json<SendMessage>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let settings = settings::get_settings(&state.pool).await?;
    let message = messages::send_message(&state.pool, state.sender(), &settings, player_id, &body.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /api/whatsapp/webhook`: subscription handshake.
pub async fn verify(State(state): State<AppState>, Query(params): Query<VerifyParams>) -> Response {
    match verify_subscription(&params, state.verify_token.as_deref()) {
        Some(challenge) => (StatusCode::OK, challenge.to_string()).into_response(),
        None => {
            tracing::warn!(mode = params.mode.as_deref().unwrap_or(""), "webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// `POST /api/whatsapp/webhook`: inbound messages.
pub async fn receive(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Json<IngestReport>> {
    let texts = payload.inbound_texts();
    if texts.is_empty() {
        return Ok(Json(IngestReport::default()));
    }
    Ok(Json(messages::ingest_inbound(&state.pool, &state.events, texts).await?))
}
