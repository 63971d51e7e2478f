//! Match routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::pagination::Page;
use crate::services::matches::{self, Match, MatchQuery, MatchUpdate, NewMatch};
use crate::services::settings;
use crate::state::AppState;

/// `GET /api/matches`: list with optional `status` and `upcoming` filters.
pub async fn list(State(state): State<AppState>, Query(query): Query<MatchQuery>) -> ApiResult<Json<Page<Match>>> {
    Ok(Json(matches::list_matches(&state.pool, &query).await?))
}

/// `POST /api/matches`: create; the fee defaults to the configured match fee.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewMatch>,
) -> ApiResult<(StatusCode, Json<Match>)> {
    let default_fee = if body.fee_per_player_paise.is_some() {
        0
    } else {
        settings::get_settings(&state.pool).await?.default_match_fee_paise
    };
    let created = matches::create_match(&state.pool, &state.events, body, default_fee).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/matches/{id}`
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Match>> {
    Ok(Json(matches::get_match(&state.pool, id).await?))
}

/// `PATCH /api/matches/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MatchUpdate>,
) -> ApiResult<Json<Match>> {
    Ok(Json(matches::update_match(&state.pool, &state.events, id, body).await?))
}

/// `DELETE /api/matches/{id}`
pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    matches::delete_match(&state.pool, &state.events, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
