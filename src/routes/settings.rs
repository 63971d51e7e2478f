//! Developer settings routes.

use axum::Json;
use axum::extract::State;

use crate::error::ApiResult;
use crate::services::settings::{self, DeveloperSettings, SettingsUpdate};
use crate::state::AppState;

/// `GET /api/settings`
pub async fn get(State(state): State<AppState>) -> ApiResult<Json<DeveloperSettings>> {
    Ok(Json(settings::get_settings(&state.pool).await?))
}

/// `PATCH /api/settings`: partial update.
pub async fn update(
    State(state): State<AppState>,
    Json(body): Json<SettingsUpdate>,
) -> ApiResult<Json<DeveloperSettings>> {
    Ok(Json(settings::update_settings(&state.pool, body).await?))
}
