//! Player roster routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::pagination::{Page, PageParams};
use crate::services::payments::{self, Payment};
use crate::services::players::{self, NewPlayer, Player, PlayerQuery, PlayerUpdate};
use crate::state::AppState;

/// `GET /api/players?search=&include_inactive=&offset=&limit=`
pub async fn list(State(state): State<AppState>, Query(query): Query<PlayerQuery>) -> ApiResult<Json<Page<Player>>> {
    Ok(Json(players::list_players(&state.pool, &query).await?))
}

/// `POST /api/players`
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewPlayer>,
) -> ApiResult<(StatusCode, Json<Player>)> {
    Ok((StatusCode::CREATED, Json(players::create_player(&state.pool, body).await?)))
}

/// `GET /api/players/{id}`
pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Player>> {
    Ok(Json(players::get_player(&state.pool, id).await?))
}

/// `PATCH /api/players/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PlayerUpdate>,
) -> ApiResult<Json<Player>> {
    Ok(Json(players::update_player(&state.pool, id, body).await?))
}

/// `DELETE /api/players/{id}`: deactivate, keeping history.
pub async fn deactivate(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Player>> {
    Ok(Json(players::deactivate_player(&state.pool, id).await?))
}

/// `GET /api/players/{id}/payments`: payment history, newest first.
pub async fn payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<Payment>>> {
    players::get_player(&state.pool, id).await?;
    Ok(Json(payments::list_for_player(&state.pool, id, page).await?))
}
