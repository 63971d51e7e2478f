//! Payment and reconciliation routes.
//!
//! Recording a payment may carry a screenshot. When AI parsing is enabled in
//! settings the screenshot goes through the payment parser first (using the
//! match date for the date check) and the result fills whatever the caller
//! left out.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::services::matches;
use crate::services::payments::{self, Dashboard, NewPayment, Payment, PaymentUpdate, Reconciliation};
use crate::services::settings;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub limit: Option<i64>,
}

/// `GET /api/matches/{id}/payments`
pub async fn list(State(state): State<AppState>, Path(match_id): Path<Uuid>) -> ApiResult<Json<Vec<Payment>>> {
    matches::get_match(&state.pool, match_id).await?;
    Ok(Json(payments::list_for_match(&state.pool, match_id).await?))
}

/// `POST /api/matches/{id}/payments`
pub async fn record(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(mut body): Json<NewPayment>,
) -> ApiResult<(StatusCode, Json<Payment>)> {
    if let Some(image) = body.image_base64.take().filter(|s| !s.trim().is_empty()) {
        let settings = settings::get_settings(&state.pool).await?;
        if settings.ai_parsing_enabled {
            let game = matches::get_match(&state.pool, match_id).await?;
            let match_date = game.starts_at.format("%Y-%m-%d").to_string();
            let parsed = state.parser.parse(&image, Some(&match_date)).await;
            body.apply_receipt(&parsed);
        } else {
            tracing::debug!(%match_id, "screenshot attached but AI parsing is disabled");
        }
    }
    let payment = payments::record_payment(&state.pool, &state.events, match_id, body).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// `GET /api/matches/{id}/reconciliation`
pub async fn reconciliation(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> ApiResult<Json<Reconciliation>> {
    Ok(Json(payments::reconciliation(&state.pool, match_id).await?))
}

/// `GET /api/payments/dashboard?limit=`
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<Dashboard>> {
    Ok(Json(payments::dashboard(&state.pool, query.limit).await?))
}

/// `GET /api/payments/{id}`
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Payment>> {
    Ok(Json(payments::get_payment(&state.pool, id).await?))
}

/// `PATCH /api/payments/{id}`: review flag and note.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PaymentUpdate>,
) -> ApiResult<Json<Payment>> {
    Ok(Json(payments::update_payment(&state.pool, &state.events, id, body).await?))
}

/// `DELETE /api/payments/{id}`
pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    payments::delete_payment(&state.pool, &state.events, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
