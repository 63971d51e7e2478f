//! User and role routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::pagination::{Page, PageParams};
use crate::services::users::{self, NewUser, Role, User};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

/// `GET /api/users`
pub async fn list(State(state): State<AppState>, Query(page): Query<PageParams>) -> ApiResult<Json<Page<User>>> {
    Ok(Json(users::list_users(&state.pool, page).await?))
}

/// `POST /api/users`
pub async fn create(State(state): State<AppState>, Json(body): Json<NewUser>) -> ApiResult<(StatusCode, Json<User>)> {
    Ok((StatusCode::CREATED, Json(users::create_user(&state.pool, body).await?)))
}

/// `PUT /api/users/{id}/role`
pub async fn change_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RoleBody>,
) -> ApiResult<Json<User>> {
    Ok(Json(users::change_role(&state.pool, id, body.role).await?))
}

/// `DELETE /api/users/{id}`
pub async fn delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    users::delete_user(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
