//! Match service: fixture CRUD and listing.
//!
//! Every successful write publishes a [`MatchEventKind`] so open views
//! refetch the match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::events::{EventBus, MatchEventKind};
use crate::pagination::{Page, PageParams};

const MATCH_COLUMNS: &str =
    "id, title, opponent, venue, starts_at, fee_per_player_paise, status, notes, created_at, updated_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl MatchStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub id: Uuid,
    pub title: String,
    pub opponent: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub fee_per_player_paise: i64,
    pub status: MatchStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type MatchRow = (
    Uuid,
    String,
    String,
    String,
    DateTime<Utc>,
    i64,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Self {
        let (id, title, opponent, venue, starts_at, fee_per_player_paise, status, notes, created_at, updated_at) = row;
        Self {
            id,
            title,
            opponent,
            venue,
            starts_at,
            fee_per_player_paise,
            status: MatchStatus::parse(&status).unwrap_or_default(),
            notes,
            created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMatch {
    #[serde(default)]
    pub title: String,
    pub opponent: String,
    #[serde(default)]
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    /// Defaults to the configured match fee when omitted.
    pub fee_per_player_paise: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchUpdate {
    pub title: Option<String>,
    pub opponent: Option<String>,
    pub venue: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub fee_per_player_paise: Option<i64>,
    pub status: Option<MatchStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchQuery {
    pub status: Option<MatchStatus>,
    /// Only matches that have not started yet, soonest first.
    #[serde(default)]
    pub upcoming: bool,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl MatchQuery {
    #[must_use]
    pub fn page(&self) -> PageParams {
        PageParams { offset: self.offset, limit: self.limit }
    }

    fn order(&self) -> &'static str {
        if self.upcoming { "starts_at ASC, id ASC" } else { "starts_at DESC, id DESC" }
    }
}

fn validate_opponent(opponent: &str) -> Result<String, ServiceError> {
    let opponent = opponent.trim();
    if opponent.is_empty() {
        return Err(ServiceError::Invalid("opponent is required".into()));
    }
    Ok(opponent.to_string())
}

fn validate_fee(fee: i64) -> Result<i64, ServiceError> {
    if fee < 0 {
        return Err(ServiceError::Invalid("fee per player must be >= 0".into()));
    }
    Ok(fee)
}

// =============================================================================
// CRUD
// =============================================================================

/// Create a match.
///
/// # Errors
///
/// Returns a validation error or a database error.
pub async fn create_match(
    pool: &PgPool,
    events: &EventBus,
    input: NewMatch,
    default_fee_paise: i64,
) -> Result<Match, ServiceError> {
    let opponent = validate_opponent(&input.opponent)?;
    let fee = validate_fee(input.fee_per_player_paise.unwrap_or(default_fee_paise))?;
    let row = sqlx::query_as::<_, MatchRow>(&format!(
        "INSERT INTO matches (id, title, opponent, venue, starts_at, fee_per_player_paise, notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {MATCH_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(input.title.trim())
    .bind(opponent)
    .bind(input.venue.trim())
    .bind(input.starts_at)
    .bind(fee)
    .bind(input.notes)
    .fetch_one(pool)
    .await?;

    let created = Match::from(row);
    tracing::info!(match_id = %created.id, opponent = %created.opponent, "match created");
    events.publish(created.id, MatchEventKind::Created);
    Ok(created)
}

/// # Errors
///
/// Returns not found or a database error.
pub async fn get_match(pool: &PgPool, id: Uuid) -> Result<Match, ServiceError> {
    sqlx::query_as::<_, MatchRow>(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Match::from)
        .ok_or(ServiceError::not_found("match", id))
}

/// List matches, newest first by default or soonest first for `upcoming`.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_matches(pool: &PgPool, query: &MatchQuery) -> Result<Page<Match>, ServiceError> {
    let page = query.page();
    let status = query.status.map(MatchStatus::as_str);
    let filter = "($1::text IS NULL OR status = $1) AND (NOT $2 OR starts_at >= now())";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM matches WHERE {filter}"))
        .bind(status)
        .bind(query.upcoming)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE {filter} ORDER BY {} OFFSET $3 LIMIT $4",
        query.order()
    ))
    .bind(status)
    .bind(query.upcoming)
    .bind(page.offset())
    .bind(page.limit())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(rows.into_iter().map(Match::from).collect(), page, total))
}

/// Partial update.
///
/// # Errors
///
/// Returns a validation error, not found, or a database error.
pub async fn update_match(
    pool: &PgPool,
    events: &EventBus,
    id: Uuid,
    update: MatchUpdate,
) -> Result<Match, ServiceError> {
    let opponent = update.opponent.as_deref().map(validate_opponent).transpose()?;
    let fee = update.fee_per_player_paise.map(validate_fee).transpose()?;
    let row = sqlx::query_as::<_, MatchRow>(&format!(
        "UPDATE matches
         SET title = COALESCE($2, title),
             opponent = COALESCE($3, opponent),
             venue = COALESCE($4, venue),
             starts_at = COALESCE($5, starts_at),
             fee_per_player_paise = COALESCE($6, fee_per_player_paise),
             status = COALESCE($7, status),
             notes = COALESCE($8, notes),
             updated_at = now()
         WHERE id = $1
         RETURNING {MATCH_COLUMNS}"
    ))
    .bind(id)
    .bind(update.title.as_deref().map(str::trim))
    .bind(opponent)
    .bind(update.venue.as_deref().map(str::trim))
    .bind(update.starts_at)
    .bind(fee)
    .bind(update.status.map(MatchStatus::as_str))
    .bind(update.notes)
    .fetch_optional(pool)
    .await?
    .ok_or(ServiceError::not_found("match", id))?;

    events.publish(id, MatchEventKind::Updated);
    Ok(row.into())
}

/// Delete a match with its squad and payments.
///
/// # Errors
///
/// Returns not found or a database error.
pub async fn delete_match(pool: &PgPool, events: &EventBus, id: Uuid) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM matches WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("match", id));
    }
    tracing::info!(match_id = %id, "match deleted");
    events.publish(id, MatchEventKind::Deleted);
    Ok(())
}

/// Non-cancelled matches, most recent kick-off first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn recent_matches(pool: &PgPool, limit: i64) -> Result<Vec<Match>, ServiceError> {
    let rows = sqlx::query_as::<_, MatchRow>(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE status <> 'cancelled' ORDER BY starts_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Match::from).collect())
}

#[cfg(test)]
#[path = "matches_test.rs"]
mod tests;
