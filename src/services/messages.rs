//! Message service: per-player WhatsApp threads.
//!
//! DESIGN
//! ======
//! The thread view polls every few seconds with an `(after, after_id)`
//! cursor taken from the last message it holds, and gets newer messages
//! oldest first, `limit` at a time with `has_more` set when a backlog
//! remains. `created_at` is always the server's receive time so the cursor
//! never skips a late webhook; the provider's own timestamp is kept in
//! `sent_at`. Each response carries the player's
//! session window: WhatsApp allows free-form replies for 24 hours after the
//! player's last inbound message, and the UI shows how long is left.
//!
//! Inbound messages arrive through the webhook and are matched to players by
//! phone digits. A reply that reads as an availability answer also updates
//! the player's next pending squad slot.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use super::players;
use super::settings::DeveloperSettings;
use super::squad::{self, Availability};
use crate::events::EventBus;
use crate::whatsapp::{InboundText, WhatsAppError, WhatsAppSend};

pub const SESSION_WINDOW_HOURS: i64 = 24;
const DEFAULT_THREAD_LIMIT: i64 = 50;
const MAX_THREAD_LIMIT: i64 = 200;
const MAX_BODY_CHARS: usize = 4096;

const MESSAGE_COLUMNS: &str = "id, player_id, direction, body, status, provider_message_id, sent_at, created_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Received,
    Sent,
    Failed,
}

impl MessageStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub player_id: Uuid,
    pub direction: Direction,
    pub body: String,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    /// When WhatsApp says the player sent it (inbound only).
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

type MessageRow = (Uuid, Uuid, String, String, String, Option<String>, Option<DateTime<Utc>>, DateTime<Utc>);

impl From<MessageRow> for Message {
    fn from((id, player_id, direction, body, status, provider_message_id, sent_at, created_at): MessageRow) -> Self {
        Self {
            id,
            player_id,
            direction: if direction == "inbound" { Direction::Inbound } else { Direction::Outbound },
            body,
            status: match status.as_str() {
                "received" => MessageStatus::Received,
                "sent" => MessageStatus::Sent,
                _ => MessageStatus::Failed,
            },
            provider_message_id,
            sent_at,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionWindow {
    pub open: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_secs: i64,
}

/// Session state given the player's last inbound message.
#[must_use]
pub fn session_window(last_inbound: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SessionWindow {
    let Some(last) = last_inbound else {
        return SessionWindow { open: false, expires_at: None, remaining_secs: 0 };
    };
    let expires_at = last + Duration::hours(SESSION_WINDOW_HOURS);
    let remaining_secs = (expires_at - now).num_seconds().max(0);
    SessionWindow { open: remaining_secs > 0, expires_at: Some(expires_at), remaining_secs }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadQuery {
    /// `created_at` of the last message the client holds.
    pub after: Option<DateTime<Utc>>,
    /// `id` of that message; breaks ties between equal timestamps.
    pub after_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl ThreadQuery {
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_THREAD_LIMIT).clamp(1, MAX_THREAD_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub player_id: Uuid,
    pub messages: Vec<Message>,
    /// Without a cursor: older messages exist. With one: more new messages
    /// are waiting and the client should fetch again right away.
    pub has_more: bool,
    pub session: SessionWindow,
    /// Seconds the UI should wait before polling again.
    pub poll_interval_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub stored: u32,
    pub ignored: u32,
    pub availability_updates: u32,
}

/// Trim a `limit + 1` fetch to `limit` rows and report whether more exist.
fn split_page<T>(mut rows: Vec<T>, limit: i64) -> (Vec<T>, bool) {
    let limit = usize::try_from(limit).unwrap_or(0);
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    (rows, has_more)
}

fn validate_body(body: &str) -> Result<&str, ServiceError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ServiceError::Invalid("message body is required".into()));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(ServiceError::Invalid(format!("message body exceeds {MAX_BODY_CHARS} characters")));
    }
    Ok(body)
}

// =============================================================================
// PERSISTENCE
// =============================================================================

/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn insert_message(
    pool: &PgPool,
    player_id: Uuid,
    direction: Direction,
    body: &str,
    status: MessageStatus,
    provider_message_id: Option<&str>,
) -> Result<Message, ServiceError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "INSERT INTO whatsapp_messages (id, player_id, direction, body, status, provider_message_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(player_id)
    .bind(direction.as_str())
    .bind(body)
    .bind(status.as_str())
    .bind(provider_message_id)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

/// Store one inbound text. Returns `None` when this provider message id is
/// already stored (a redelivered webhook).
async fn insert_inbound(
    pool: &PgPool,
    player_id: Uuid,
    text: &InboundText,
) -> Result<Option<Message>, ServiceError> {
    let sent_at = text.timestamp.and_then(|ts| Utc.timestamp_opt(ts, 0).single());
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "INSERT INTO whatsapp_messages (id, player_id, direction, body, status, provider_message_id, sent_at)
         VALUES ($1, $2, 'inbound', $3, 'received', $4, $5)
         ON CONFLICT (provider_message_id) DO NOTHING
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(player_id)
    .bind(&text.body)
    .bind(&text.provider_message_id)
    .bind(sent_at)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Message::from))
}

async fn last_inbound_at(pool: &PgPool, player_id: Uuid) -> Result<Option<DateTime<Utc>>, ServiceError> {
    let at = sqlx::query_scalar(
        "SELECT max(COALESCE(sent_at, created_at)) FROM whatsapp_messages
         WHERE player_id = $1 AND direction = 'inbound'",
    )
    .bind(player_id)
    .fetch_one(pool)
    .await?;
    Ok(at)
}

/// Fetch a player's thread, oldest first, with the session window.
///
/// # Errors
///
/// Returns not found for an unknown player, or a database error.
pub async fn thread(
    pool: &PgPool,
    settings: &DeveloperSettings,
    player_id: Uuid,
    query: &ThreadQuery,
) -> Result<Thread, ServiceError> {
    players::get_player(pool, player_id).await?;
    let limit = query.limit();
    let (rows, has_more) = match query.after {
        Some(after) => {
            // Oldest first past the cursor so a burst is paged, never skipped.
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM whatsapp_messages
                 WHERE player_id = $1
                   AND (created_at, id) > ($2, COALESCE($3, 'ffffffff-ffff-ffff-ffff-ffffffffffff'::uuid))
                 ORDER BY created_at ASC, id ASC
                 LIMIT $4"
            ))
            .bind(player_id)
            .bind(after)
            .bind(query.after_id)
            .bind(limit + 1)
            .fetch_all(pool)
            .await?;
            split_page(rows, limit)
        }
        None => {
            // Initial load: the newest page, flipped to oldest first.
            let rows = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM whatsapp_messages
                 WHERE player_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2"
            ))
            .bind(player_id)
            .bind(limit + 1)
            .fetch_all(pool)
            .await?;
            let (mut rows, has_more) = split_page(rows, limit);
            rows.reverse();
            (rows, has_more)
        }
    };

    let session = session_window(last_inbound_at(pool, player_id).await?, Utc::now());
    Ok(Thread {
        player_id,
        messages: rows.into_iter().map(Message::from).collect(),
        has_more,
        session,
        poll_interval_secs: settings.poll_interval_secs,
    })
}

/// Send a free-form message and record the outcome in the thread. A failed
/// send is stored with status `failed` and returned, not raised.
///
/// # Errors
///
/// Returns a WhatsApp error when messaging is unavailable, a validation
/// error, not found for an unknown player, or a database error.
pub async fn send_message(
    pool: &PgPool,
    sender: Option<&dyn WhatsAppSend>,
    settings: &DeveloperSettings,
    player_id: Uuid,
    body: &str,
) -> Result<Message, ServiceError> {
    let sender = sender.ok_or(WhatsAppError::NotConfigured)?;
    if !settings.whatsapp_enabled {
        return Err(WhatsAppError::Disabled.into());
    }
    let body = validate_body(body)?;
    let player = players::get_player(pool, player_id).await?;

    let (status, provider_id) = match sender.send_text(&player.phone, body).await {
        Ok(id) => (MessageStatus::Sent, Some(id)),
        Err(e) => {
            tracing::warn!(%player_id, error = %e, "whatsapp send failed");
            (MessageStatus::Failed, None)
        }
    };
    insert_message(pool, player_id, Direction::Outbound, body, status, provider_id.as_deref()).await
}

/// Store inbound webhook texts for known players.
///
/// # Errors
///
/// Returns a database error if storing a message fails.
pub async fn ingest_inbound(
    pool: &PgPool,
    events: &EventBus,
    texts: Vec<InboundText>,
) -> Result<IngestReport, ServiceError> {
    let mut report = IngestReport::default();
    for text in texts {
        let Some(player) = players::find_by_phone_digits(pool, &text.from).await? else {
            tracing::info!(from = %text.from, "inbound message from unknown sender ignored");
            report.ignored += 1;
            continue;
        };
        if insert_inbound(pool, player.id, &text).await?.is_none() {
            tracing::debug!(id = %text.provider_message_id, "duplicate webhook delivery");
            report.ignored += 1;
            continue;
        }
        report.stored += 1;

        if let Some(availability) = Availability::from_reply(&text.body) {
            if squad::apply_reply(pool, events, player.id, availability).await?.is_some() {
                report.availability_updates += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;
