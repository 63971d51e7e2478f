//! Squad availability routes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::services::settings;
use crate::services::squad::{self, AddPlayers, ReminderReport, SetAvailability, SquadMember, SquadSummary};
use crate::state::AppState;

/// `GET /api/matches/{id}/squad`
pub async fn list(State(state): State<AppState>, Path(match_id): Path<Uuid>) -> ApiResult<Json<Vec<SquadMember>>> {
    Ok(Json(squad::list_squad(&state.pool, match_id).await?))
}

/// `POST /api/matches/{id}/squad`: add players as pending.
pub async fn add(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(body): Json<AddPlayers>,
) -> ApiResult<Json<Vec<SquadMember>>> {
    Ok(Json(squad::add_players(&state.pool, &state.events, match_id, &body.player_ids).await?))
}

/// `PUT /api/matches/{id}/squad/{player_id}`: record a response.
pub async fn set_availability(
    State(state): State<AppState>,
    Path((match_id, player_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<SetAvailability>,
) -> ApiResult<Json<SquadMember>> {
    Ok(Json(
        squad::set_availability(&state.pool, &state.events, match_id, player_id, body.availability).await?,
    ))
}

/// `DELETE /api/matches/{id}/squad/{player_id}`
pub async fn remove(
    State(state): State<AppState>,
    Path((match_id, player_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    squad::remove_player(&state.pool, &state.events, match_id, player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/matches/{id}/squad/summary`
pub async fn summary(State(state): State<AppState>, Path(match_id): Path<Uuid>) -> ApiResult<Json<SquadSummary>> {
    Ok(Json(squad::squad_summary(&state.pool, match_id).await?))
}

/// `POST /api/matches/{id}/squad/remind`: message every pending member.
pub async fn remind(State(state): State<AppState>, Path(match_id): Path<Uuid>) -> ApiResult<Json<ReminderReport>> {
    let settings = settings::get_settings(&state.pool).await?;
    Ok(Json(squad::remind_pending(&state.pool, state.sender(), &settings, match_id).await?))
}
