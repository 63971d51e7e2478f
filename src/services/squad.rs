//! Squad service: who is playing in each match.
//!
//! DESIGN
//! ======
//! Players are added to a match as `pending` and move to `yes`, `no`, or
//! `tentative` when they respond, either from the UI or by replying to a
//! WhatsApp reminder. Reminders fan out to every pending member at once and
//! each outcome is recorded in the player's message thread, so one bad
//! number never blocks the rest.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use super::matches::{self, Match};
use super::messages::{self, Direction, MessageStatus};
use super::settings::DeveloperSettings;
use crate::events::{EventBus, MatchEventKind};
use crate::whatsapp::{WhatsAppError, WhatsAppSend};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Yes,
    No,
    Tentative,
    #[default]
    Pending,
}

impl Availability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Tentative => "tentative",
            Self::Pending => "pending",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "tentative" => Some(Self::Tentative),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    /// Interpret a WhatsApp reply to an availability reminder.
    ///
    /// A reply counts when it starts with YES, NO or MAYBE ("yes! count me
    /// in"), or when the whole reply is a short answer such as "y" or "out".
    /// Anything else ("in traffic, call later") is left as a plain message.
    #[must_use]
    pub fn from_reply(text: &str) -> Option<Self> {
        let mut words = text
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|w| !w.is_empty());
        let first = words.next()?.to_lowercase();
        let only_word = words.next().is_none();
        match first.as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "maybe" => Some(Self::Tentative),
            "y" | "in" | "available" if only_word => Some(Self::Yes),
            "n" | "out" | "unavailable" if only_word => Some(Self::No),
            "tentative" if only_word => Some(Self::Tentative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SquadMember {
    pub match_id: Uuid,
    pub player_id: Uuid,
    pub player_name: String,
    pub availability: Availability,
    pub responded_at: Option<DateTime<Utc>>,
}

type SquadRow = (Uuid, Uuid, String, String, Option<DateTime<Utc>>);

impl From<SquadRow> for SquadMember {
    fn from((match_id, player_id, player_name, availability, responded_at): SquadRow) -> Self {
        Self {
            match_id,
            player_id,
            player_name,
            availability: Availability::parse(&availability).unwrap_or_default(),
            responded_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SquadSummary {
    pub yes: u32,
    pub no: u32,
    pub tentative: u32,
    pub pending: u32,
    pub total: u32,
}

#[must_use]
pub fn summarize(members: &[SquadMember]) -> SquadSummary {
    members.iter().fold(SquadSummary::default(), |mut s, m| {
        match m.availability {
            Availability::Yes => s.yes += 1,
            Availability::No => s.no += 1,
            Availability::Tentative => s.tentative += 1,
            Availability::Pending => s.pending += 1,
        }
        s.total += 1;
        s
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddPlayers {
    pub player_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetAvailability {
    pub availability: Availability,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub sent: u32,
    pub failed: u32,
    pub failures: Vec<ReminderFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderFailure {
    pub player_id: Uuid,
    pub error: String,
}

/// One reminder ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTarget {
    pub player_id: Uuid,
    pub phone: String,
    pub body: String,
}

// =============================================================================
// QUERIES
// =============================================================================

const SQUAD_SELECT: &str = "SELECT s.match_id, s.player_id, p.name, s.availability, s.responded_at
     FROM squad_members s
     JOIN players p ON p.id = s.player_id";

/// # Errors
///
/// Returns not found for an unknown match, or a database error.
pub async fn list_squad(pool: &PgPool, match_id: Uuid) -> Result<Vec<SquadMember>, ServiceError> {
    matches::get_match(pool, match_id).await?;
    let rows = sqlx::query_as::<_, SquadRow>(&format!("{SQUAD_SELECT} WHERE s.match_id = $1 ORDER BY p.name ASC"))
        .bind(match_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(SquadMember::from).collect())
}

/// # Errors
///
/// Returns not found for an unknown match, or a database error.
pub async fn squad_summary(pool: &PgPool, match_id: Uuid) -> Result<SquadSummary, ServiceError> {
    Ok(summarize(&list_squad(pool, match_id).await?))
}

/// Add active players to a match as `pending`. Players already in the
/// squad keep their response.
///
/// # Errors
///
/// Returns a validation error for an empty list, not found for an unknown
/// match, or a database error.
pub async fn add_players(
    pool: &PgPool,
    events: &EventBus,
    match_id: Uuid,
    player_ids: &[Uuid],
) -> Result<Vec<SquadMember>, ServiceError> {
    if player_ids.is_empty() {
        return Err(ServiceError::Invalid("player_ids must not be empty".into()));
    }
    matches::get_match(pool, match_id).await?;
    let added = sqlx::query(
        "INSERT INTO squad_members (match_id, player_id)
         SELECT $1, id FROM players WHERE id = ANY($2) AND active
         ON CONFLICT (match_id, player_id) DO NOTHING",
    )
    .bind(match_id)
    .bind(player_ids)
    .execute(pool)
    .await?
    .rows_affected();

    tracing::info!(%match_id, requested = player_ids.len(), added, "squad players added");
    if added > 0 {
        events.publish(match_id, MatchEventKind::SquadChanged);
    }
    list_squad(pool, match_id).await
}

/// # Errors
///
/// Returns not found when the player is not in the match squad, or a
/// database error.
pub async fn set_availability(
    pool: &PgPool,
    events: &EventBus,
    match_id: Uuid,
    player_id: Uuid,
    availability: Availability,
) -> Result<SquadMember, ServiceError> {
    let row = sqlx::query_as::<_, SquadRow>(
        "WITH updated AS (
            UPDATE squad_members
            SET availability = $3,
                responded_at = CASE WHEN $3 = 'pending' THEN NULL ELSE now() END
            WHERE match_id = $1 AND player_id = $2
            RETURNING match_id, player_id, availability, responded_at
         )
         SELECT u.match_id, u.player_id, p.name, u.availability, u.responded_at
         FROM updated u JOIN players p ON p.id = u.player_id",
    )
    .bind(match_id)
    .bind(player_id)
    .bind(availability.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or(ServiceError::not_found("squad member", player_id))?;

    events.publish(match_id, MatchEventKind::SquadChanged);
    Ok(row.into())
}

/// # Errors
///
/// Returns not found when the player is not in the squad, or a database
/// error.
pub async fn remove_player(
    pool: &PgPool,
    events: &EventBus,
    match_id: Uuid,
    player_id: Uuid,
) -> Result<(), ServiceError> {
    let result = sqlx::query("DELETE FROM squad_members WHERE match_id = $1 AND player_id = $2")
        .bind(match_id)
        .bind(player_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("squad member", player_id));
    }
    events.publish(match_id, MatchEventKind::SquadChanged);
    Ok(())
}

/// Record a WhatsApp reply against the player's next scheduled match where
/// they are still pending or tentative. Returns the match touched, if any.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn apply_reply(
    pool: &PgPool,
    events: &EventBus,
    player_id: Uuid,
    availability: Availability,
) -> Result<Option<Uuid>, ServiceError> {
    let match_id: Option<Uuid> = sqlx::query_scalar(
        "UPDATE squad_members s
         SET availability = $2, responded_at = now()
         WHERE s.player_id = $1 AND s.match_id = (
             SELECT m.id FROM matches m
             JOIN squad_members sm ON sm.match_id = m.id
             WHERE sm.player_id = $1
               AND sm.availability IN ('pending', 'tentative')
               AND m.status = 'scheduled'
               AND m.starts_at >= now()
             ORDER BY m.starts_at ASC
             LIMIT 1
         )
         RETURNING s.match_id",
    )
    .bind(player_id)
    .bind(availability.as_str())
    .fetch_optional(pool)
    .await?;

    if let Some(match_id) = match_id {
        tracing::info!(%player_id, %match_id, availability = availability.as_str(), "availability from reply");
        events.publish(match_id, MatchEventKind::SquadChanged);
    }
    Ok(match_id)
}

// =============================================================================
// REMINDERS
// =============================================================================

/// Build reminder messages for pending members.
#[must_use]
pub fn reminder_targets(
    game: &Match,
    settings: &DeveloperSettings,
    pending: Vec<(Uuid, String, String)>,
) -> Vec<ReminderTarget> {
    let date = game.starts_at.format("%a %d %b %Y").to_string();
    pending
        .into_iter()
        .map(|(player_id, name, phone)| ReminderTarget {
            player_id,
            body: settings.render_reminder(&name, &game.opponent, &date),
            phone,
        })
        .collect()
}

/// Send every reminder concurrently and pair each target with its outcome.
pub async fn send_reminders(
    sender: &dyn WhatsAppSend,
    targets: Vec<ReminderTarget>,
) -> Vec<(ReminderTarget, Result<String, WhatsAppError>)> {
    let sends = targets.iter().map(|t| sender.send_text(&t.phone, &t.body));
    let results = join_all(sends).await;
    targets.into_iter().zip(results).collect()
}

/// Message every pending squad member for a match.
///
/// # Errors
///
/// Returns a WhatsApp error when messaging is unavailable, not found for an
/// unknown match, or a database error. Individual send failures are
/// reported in the [`ReminderReport`].
pub async fn remind_pending(
    pool: &PgPool,
    sender: Option<&dyn WhatsAppSend>,
    settings: &DeveloperSettings,
    match_id: Uuid,
) -> Result<ReminderReport, ServiceError> {
    let sender = sender.ok_or(WhatsAppError::NotConfigured)?;
    if !settings.whatsapp_enabled {
        return Err(WhatsAppError::Disabled.into());
    }
    let game = matches::get_match(pool, match_id).await?;
    let pending = sqlx::query_as::<_, (Uuid, String, String)>(
        "SELECT p.id, p.name, p.phone
         FROM squad_members s JOIN players p ON p.id = s.player_id
         WHERE s.match_id = $1 AND s.availability = 'pending' AND p.active
         ORDER BY p.name ASC",
    )
    .bind(match_id)
    .fetch_all(pool)
    .await?;

    let outcomes = send_reminders(sender, reminder_targets(&game, settings, pending)).await;
    let mut report = ReminderReport::default();
    for (target, outcome) in outcomes {
        let (status, provider_id) = match outcome {
            Ok(id) => {
                report.sent += 1;
                (MessageStatus::Sent, Some(id))
            }
            Err(e) => {
                tracing::warn!(player_id = %target.player_id, error = %e, "reminder failed");
                report.failed += 1;
                report.failures.push(ReminderFailure { player_id: target.player_id, error: e.to_string() });
                (MessageStatus::Failed, None)
            }
        };
        messages::insert_message(pool, target.player_id, Direction::Outbound, &target.body, status, provider_id.as_deref())
            .await?;
    }
    tracing::info!(%match_id, sent = report.sent, failed = report.failed, "reminders sent");
    Ok(report)
}

#[cfg(test)]
#[path = "squad_test.rs"]
mod tests;
