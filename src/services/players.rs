//! Player service: roster CRUD, search, and phone lookup.
//!
//! Phones are stored normalised (digits with an optional leading `+`) so
//! webhook senders, which arrive as bare digits, can be matched by digits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::pagination::{Page, PageParams};

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

const PLAYER_COLUMNS: &str = "id, name, phone, user_id, active, created_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub user_id: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

type PlayerRow = (Uuid, String, String, Option<Uuid>, bool, DateTime<Utc>);

impl From<PlayerRow> for Player {
    fn from((id, name, phone, user_id, active, created_at): PlayerRow) -> Self {
        Self { id, name, phone, user_id, active, created_at }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<Uuid>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl PlayerQuery {
    #[must_use]
    pub fn page(&self) -> PageParams {
        PageParams { offset: self.offset, limit: self.limit }
    }

    /// `ILIKE` pattern for the search term, with wildcards escaped.
    #[must_use]
    pub fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        Some(format!("%{escaped}%"))
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Normalise a phone number to digits with an optional leading `+`.
///
/// # Errors
///
/// Returns [`ServiceError::Invalid`] for letters or an implausible length.
pub fn normalize_phone(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };
    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return Err(ServiceError::Invalid(format!("invalid phone number: {raw}"))),
        }
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(ServiceError::Invalid(format!("invalid phone number: {raw}")));
    }
    Ok(format!("{plus}{digits}"))
}

fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Invalid("player name is required".into()));
    }
    Ok(name.to_string())
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a player.
///
/// # Errors
///
/// Returns a validation error, a conflict on a duplicate phone, or a
/// database error.
pub async fn create_player(pool: &PgPool, input: NewPlayer) -> Result<Player, ServiceError> {
    let name = validate_name(&input.name)?;
    let phone = normalize_phone(&input.phone)?;
    let row = sqlx::query_as::<_, PlayerRow>(&format!(
        "INSERT INTO players (id, name, phone, user_id) VALUES ($1, $2, $3, $4) RETURNING {PLAYER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(phone)
    .bind(input.user_id)
    .fetch_one(pool)
    .await
    .map_err(|e| ServiceError::unique_violation(e, "a player with this phone already exists"))?;
    Ok(row.into())
}

/// # Errors
///
/// Returns not found or a database error.
pub async fn get_player(pool: &PgPool, id: Uuid) -> Result<Player, ServiceError> {
    sqlx::query_as::<_, PlayerRow>(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Player::from)
        .ok_or(ServiceError::not_found("player", id))
}

/// Partial update. Fields left `None` keep their value.
///
/// # Errors
///
/// Returns a validation error, not found, a conflict, or a database error.
pub async fn update_player(pool: &PgPool, id: Uuid, update: PlayerUpdate) -> Result<Player, ServiceError> {
    let name = update.name.as_deref().map(validate_name).transpose()?;
    let phone = update.phone.as_deref().map(normalize_phone).transpose()?;
    sqlx::query_as::<_, PlayerRow>(&format!(
        "UPDATE players
         SET name = COALESCE($2, name),
             phone = COALESCE($3, phone),
             user_id = COALESCE($4, user_id),
             active = COALESCE($5, active)
         WHERE id = $1
         RETURNING {PLAYER_COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(phone)
    .bind(update.user_id)
    .bind(update.active)
    .fetch_optional(pool)
    .await
    .map_err(|e| ServiceError::unique_violation(e, "a player with this phone already exists"))?
    .map(Player::from)
    .ok_or(ServiceError::not_found("player", id))
}

/// Soft-delete: inactive players drop out of squads and default listings
/// but keep their payment history.
///
/// # Errors
///
/// Returns not found or a database error.
pub async fn deactivate_player(pool: &PgPool, id: Uuid) -> Result<Player, ServiceError> {
    update_player(pool, id, PlayerUpdate { active: Some(false), ..PlayerUpdate::default() }).await
}

/// List players by name, optionally filtered by a case-insensitive search
/// on name or phone.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_players(pool: &PgPool, query: &PlayerQuery) -> Result<Page<Player>, ServiceError> {
    let page = query.page();
    let pattern = query.search_pattern();
    let filter = "($1::text IS NULL OR name ILIKE $1 OR phone ILIKE $1) AND ($2 OR active)";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM players WHERE {filter}"))
        .bind(pattern.as_deref())
        .bind(query.include_inactive)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, PlayerRow>(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players WHERE {filter} ORDER BY name ASC, id ASC OFFSET $3 LIMIT $4"
    ))
    .bind(pattern.as_deref())
    .bind(query.include_inactive)
    .bind(page.offset())
    .bind(page.limit())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(rows.into_iter().map(Player::from).collect(), page, total))
}

/// Find an active player whose phone digits equal `digits` (the webhook
/// sender format, no `+`).
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_by_phone_digits(pool: &PgPool, digits: &str) -> Result<Option<Player>, ServiceError> {
    let row = sqlx::query_as::<_, PlayerRow>(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players
         WHERE regexp_replace(phone, '[^0-9]', '', 'g') = $1 AND active
         LIMIT 1"
    ))
    .bind(digits)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Player::from))
}

#[cfg(test)]
#[path = "players_test.rs"]
mod tests;
