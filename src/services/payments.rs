//! Payment service: match fee collection and reconciliation.
//!
//! DESIGN
//! ======
//! Payments are recorded per player per match, in paise. A payment may come
//! from a parsed UPI screenshot; its hash is unique across all payments so a
//! screenshot cannot be claimed twice.
//!
//! Reconciliation is computed on read from the squad and payment rows:
//! every squad member who said `yes` owes the match fee, and so does anyone
//! who has paid even if they are not marked available. Nothing is cached,
//! so the numbers are always consistent with the rows they came from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use super::matches::{self, Match};
use super::receipt::{self, ParsePaymentResponse};
use super::squad::{self, Availability, SquadMember};
use crate::events::{EventBus, MatchEventKind};
use crate::pagination::{Page, PageParams};

pub const DEFAULT_DASHBOARD_MATCHES: i64 = 10;
const MAX_DASHBOARD_MATCHES: i64 = 50;

const PAYMENT_SELECT: &str = "SELECT pay.id, pay.match_id, pay.player_id, p.name, pay.amount_paise, pay.method,
            pay.transaction_id, pay.screenshot_hash, pay.requires_review, pay.note, pay.created_at
     FROM payments pay
     JOIN players p ON p.id = pay.player_id";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    #[default]
    Upi,
    BankTransfer,
    Cash,
    Other,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upi => "upi",
            Self::BankTransfer => "bank_transfer",
            Self::Cash => "cash",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "upi" => Self::Upi,
            "bank_transfer" => Self::BankTransfer,
            "cash" => Self::Cash,
            _ => Self::Other,
        }
    }
}

impl From<receipt::PaymentMethod> for Method {
    fn from(method: receipt::PaymentMethod) -> Self {
        match method {
            receipt::PaymentMethod::Upi => Self::Upi,
            receipt::PaymentMethod::Neft | receipt::PaymentMethod::Imps => Self::BankTransfer,
            receipt::PaymentMethod::Unknown => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub match_id: Uuid,
    pub player_id: Uuid,
    pub player_name: String,
    pub amount_paise: i64,
    pub method: Method,
    pub transaction_id: String,
    pub screenshot_hash: Option<String>,
    pub requires_review: bool,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

type PaymentRow = (Uuid, Uuid, Uuid, String, i64, String, String, Option<String>, bool, String, DateTime<Utc>);

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        let (id, match_id, player_id, player_name, amount_paise, method, transaction_id, screenshot_hash, requires_review, note, created_at) =
            row;
        Self {
            id,
            match_id,
            player_id,
            player_name,
            amount_paise,
            method: Method::parse(&method),
            transaction_id,
            screenshot_hash,
            requires_review,
            note,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPayment {
    pub player_id: Uuid,
    /// May be omitted when a screenshot is attached and parsed.
    pub amount_paise: Option<i64>,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub transaction_id: String,
    pub screenshot_hash: Option<String>,
    #[serde(default)]
    pub requires_review: bool,
    #[serde(default)]
    pub note: String,
    /// Optional screenshot to run through the payment parser first.
    pub image_base64: Option<String>,
}

impl NewPayment {
    /// Fill missing fields from a parse result. Explicit values win; review
    /// flags and the screenshot hash always come from the parser.
    pub fn apply_receipt(&mut self, parsed: &ParsePaymentResponse) {
        if !parsed.metadata.image_hash.is_empty() {
            self.screenshot_hash = Some(parsed.metadata.image_hash.clone());
        }
        self.requires_review |= parsed.metadata.requires_review;
        if !parsed.success {
            if let Some(message) = &parsed.error_message {
                self.note = join_note(&self.note, message);
            }
            return;
        }
        if self.amount_paise.is_none() && parsed.data.amount > 0.0 {
            self.amount_paise = Some(rupees_to_paise(parsed.data.amount));
        }
        if self.transaction_id.is_empty() {
            self.transaction_id.clone_from(&parsed.data.transaction_id);
        }
        self.method = parsed.data.payment_method.into();
        if let Some(reason) = parsed.metadata.review_reason {
            let reason = serde_json::to_value(reason).ok().and_then(|v| v.as_str().map(str::to_owned));
            if let Some(reason) = reason {
                self.note = join_note(&self.note, &format!("review: {reason}"));
            }
        }
    }
}

fn join_note(existing: &str, extra: &str) -> String {
    if existing.is_empty() { extra.to_string() } else { format!("{existing}; {extra}") }
}

/// Convert a rupee amount to paise, rounding to the nearest paisa.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn rupees_to_paise(rupees: f64) -> i64 {
    (rupees * 100.0).round() as i64
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentUpdate {
    pub requires_review: Option<bool>,
    pub note: Option<String>,
}

// =============================================================================
// RECONCILIATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DueStatus {
    Paid,
    Partial,
    Unpaid,
    Overpaid,
}

#[must_use]
pub fn due_status(expected_paise: i64, paid_paise: i64) -> DueStatus {
    if paid_paise > expected_paise {
        DueStatus::Overpaid
    } else if paid_paise == expected_paise {
        DueStatus::Paid
    } else if paid_paise <= 0 {
        DueStatus::Unpaid
    } else {
        DueStatus::Partial
    }
}

/// Share of the expected total collected, capped at 100.
#[must_use]
pub fn percent_complete(expected_paise: i64, collected_paise: i64) -> u8 {
    if expected_paise <= 0 {
        return if collected_paise > 0 { 100 } else { 0 };
    }
    let pct = collected_paise.max(0).saturating_mul(100) / expected_paise;
    u8::try_from(pct.min(100)).unwrap_or(100)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerDue {
    pub player_id: Uuid,
    pub player_name: String,
    pub availability: Option<Availability>,
    pub expected_paise: i64,
    pub paid_paise: i64,
    pub balance_paise: i64,
    pub status: DueStatus,
    pub payments: u32,
    pub needs_review: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationTotals {
    pub expected_paise: i64,
    pub collected_paise: i64,
    pub outstanding_paise: i64,
    pub percent_complete: u8,
    pub paid: u32,
    pub partial: u32,
    pub unpaid: u32,
    pub overpaid: u32,
    pub needs_review: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub match_id: Uuid,
    pub fee_per_player_paise: i64,
    pub totals: ReconciliationTotals,
    pub players: Vec<PlayerDue>,
}

/// Join a squad with its payments into per-player dues and match totals.
#[must_use]
pub fn reconcile(game: &Match, squad: &[SquadMember], payments: &[Payment]) -> Reconciliation {
    let fee = game.fee_per_player_paise;
    let mut dues: BTreeMap<Uuid, PlayerDue> = BTreeMap::new();

    for member in squad {
        dues.insert(
            member.player_id,
            PlayerDue {
                player_id: member.player_id,
                player_name: member.player_name.clone(),
                availability: Some(member.availability),
                expected_paise: if member.availability == Availability::Yes { fee } else { 0 },
                paid_paise: 0,
                balance_paise: 0,
                status: DueStatus::Unpaid,
                payments: 0,
                needs_review: false,
            },
        );
    }

    for payment in payments.iter().filter(|p| p.match_id == game.id) {
        let due = dues.entry(payment.player_id).or_insert_with(|| PlayerDue {
            player_id: payment.player_id,
            player_name: payment.player_name.clone(),
            availability: None,
            expected_paise: 0,
            paid_paise: 0,
            balance_paise: 0,
            status: DueStatus::Unpaid,
            payments: 0,
            needs_review: false,
        });
        // Anyone who paid owes the fee, whatever they answered.
        due.expected_paise = fee;
        due.paid_paise += payment.amount_paise;
        due.payments += 1;
        due.needs_review |= payment.requires_review;
    }

    let mut totals = ReconciliationTotals::default();
    let mut players: Vec<PlayerDue> = dues
        .into_values()
        .filter(|d| d.availability == Some(Availability::Yes) || d.expected_paise > 0 || d.paid_paise > 0)
        .map(|mut d| {
            d.balance_paise = d.expected_paise - d.paid_paise;
            d.status = due_status(d.expected_paise, d.paid_paise);
            totals.expected_paise += d.expected_paise;
            totals.collected_paise += d.paid_paise;
            totals.outstanding_paise += d.balance_paise.max(0);
            match d.status {
                DueStatus::Paid => totals.paid += 1,
                DueStatus::Partial => totals.partial += 1,
                DueStatus::Unpaid => totals.unpaid += 1,
                DueStatus::Overpaid => totals.overpaid += 1,
            }
            if d.needs_review {
                totals.needs_review += 1;
            }
            d
        })
        .collect();
    totals.percent_complete = percent_complete(totals.expected_paise, totals.collected_paise);

    // Largest balance first so the collector sees who to chase.
    players.sort_by(|a, b| b.balance_paise.cmp(&a.balance_paise).then_with(|| a.player_name.cmp(&b.player_name)));

    Reconciliation { match_id: game.id, fee_per_player_paise: fee, totals, players }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEntry {
    #[serde(rename = "match")]
    pub game: Match,
    pub totals: ReconciliationTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub matches: Vec<DashboardEntry>,
    pub expected_paise: i64,
    pub collected_paise: i64,
    pub outstanding_paise: i64,
    pub needs_review: u32,
}

#[must_use]
pub fn summarize_dashboard(entries: Vec<DashboardEntry>) -> Dashboard {
    let (expected, collected, outstanding, review) = entries.iter().fold((0, 0, 0, 0), |acc, e| {
        (
            acc.0 + e.totals.expected_paise,
            acc.1 + e.totals.collected_paise,
            acc.2 + e.totals.outstanding_paise,
            acc.3 + e.totals.needs_review,
        )
    });
    Dashboard {
        matches: entries,
        expected_paise: expected,
        collected_paise: collected,
        outstanding_paise: outstanding,
        needs_review: review,
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

async fn existing_hash_owner(pool: &PgPool, hash: &str) -> Result<Option<Uuid>, ServiceError> {
    let id = sqlx::query_scalar("SELECT id FROM payments WHERE screenshot_hash = $1")
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Record a payment for a match.
///
/// # Errors
///
/// Returns a validation error for a missing or non-positive amount, not
/// found for an unknown match, a conflict for a reused screenshot, or a
/// database error.
pub async fn record_payment(
    pool: &PgPool,
    events: &EventBus,
    match_id: Uuid,
    input: NewPayment,
) -> Result<Payment, ServiceError> {
    let amount = input
        .amount_paise
        .filter(|a| *a > 0)
        .ok_or_else(|| ServiceError::Invalid("amount_paise must be > 0".into()))?;
    matches::get_match(pool, match_id).await?;

    let hash = input.screenshot_hash.filter(|h| !h.is_empty());
    if let Some(hash) = hash.as_deref() {
        if let Some(owner) = existing_hash_owner(pool, hash).await? {
            tracing::warn!(%match_id, payment_id = %owner, "duplicate screenshot rejected");
            return Err(ServiceError::Conflict(format!("duplicate screenshot: already recorded as payment {owner}")));
        }
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO payments
            (id, match_id, player_id, amount_paise, method, transaction_id, screenshot_hash, requires_review, note)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(id)
    .bind(match_id)
    .bind(input.player_id)
    .bind(amount)
    .bind(input.method.as_str())
    .bind(input.transaction_id.trim())
    .bind(hash.as_deref())
    .bind(input.requires_review)
    .bind(input.note.trim())
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            ServiceError::not_found("player", input.player_id)
        }
        _ => ServiceError::unique_violation(e, "duplicate screenshot"),
    })?;

    tracing::info!(%match_id, payment_id = %id, amount_paise = amount, review = input.requires_review, "payment recorded");
    events.publish(match_id, MatchEventKind::PaymentRecorded);
    get_payment(pool, id).await
}

/// # Errors
///
/// Returns not found or a database error.
pub async fn get_payment(pool: &PgPool, id: Uuid) -> Result<Payment, ServiceError> {
    sqlx::query_as::<_, PaymentRow>(&format!("{PAYMENT_SELECT} WHERE pay.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Payment::from)
        .ok_or(ServiceError::not_found("payment", id))
}

/// # Errors
///
/// Returns not found for an unknown match, or a database error.
pub async fn list_for_match(pool: &PgPool, match_id: Uuid) -> Result<Vec<Payment>, ServiceError> {
    matches::get_match(pool, match_id).await?;
    payments_for_match(pool, match_id).await
}

async fn payments_for_match(pool: &PgPool, match_id: Uuid) -> Result<Vec<Payment>, ServiceError> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "{PAYMENT_SELECT} WHERE pay.match_id = $1 ORDER BY pay.created_at ASC"
    ))
    .bind(match_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Payment::from).collect())
}

/// A player's payment history, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_for_player(pool: &PgPool, player_id: Uuid, page: PageParams) -> Result<Page<Payment>, ServiceError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE player_id = $1")
        .bind(player_id)
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "{PAYMENT_SELECT} WHERE pay.player_id = $1 ORDER BY pay.created_at DESC, pay.id DESC OFFSET $2 LIMIT $3"
    ))
    .bind(player_id)
    .bind(page.offset())
    .bind(page.limit())
    .fetch_all(pool)
    .await?;
    Ok(Page::new(rows.into_iter().map(Payment::from).collect(), page, total))
}

/// Resolve or annotate a payment under review.
///
/// # Errors
///
/// Returns not found or a database error.
pub async fn update_payment(
    pool: &PgPool,
    events: &EventBus,
    id: Uuid,
    update: PaymentUpdate,
) -> Result<Payment, ServiceError> {
    let match_id: Uuid = sqlx::query_scalar(
        "UPDATE payments
         SET requires_review = COALESCE($2, requires_review), note = COALESCE($3, note)
         WHERE id = $1
         RETURNING match_id",
    )
    .bind(id)
    .bind(update.requires_review)
    .bind(update.note)
    .fetch_optional(pool)
    .await?
    .ok_or(ServiceError::not_found("payment", id))?;
    events.publish(match_id, MatchEventKind::PaymentRecorded);
    get_payment(pool, id).await
}

/// # Errors
///
/// Returns not found or a database error.
pub async fn delete_payment(pool: &PgPool, events: &EventBus, id: Uuid) -> Result<(), ServiceError> {
    let match_id: Uuid = sqlx::query_scalar("DELETE FROM payments WHERE id = $1 RETURNING match_id")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ServiceError::not_found("payment", id))?;
    tracing::info!(%match_id, payment_id = %id, "payment deleted");
    events.publish(match_id, MatchEventKind::PaymentRecorded);
    Ok(())
}

async fn reconcile_match(pool: &PgPool, game: Match) -> Result<(Match, Reconciliation), ServiceError> {
    let (squad, payments) = futures::try_join!(squad::list_squad(pool, game.id), payments_for_match(pool, game.id))?;
    let recon = reconcile(&game, &squad, &payments);
    Ok((game, recon))
}

/// # Errors
///
/// Returns not found for an unknown match, or a database error.
pub async fn reconciliation(pool: &PgPool, match_id: Uuid) -> Result<Reconciliation, ServiceError> {
    let game = matches::get_match(pool, match_id).await?;
    Ok(reconcile_match(pool, game).await?.1)
}

/// Recent matches with their collection totals.
///
/// # Errors
///
/// Returns a database error if any query fails.
pub async fn dashboard(pool: &PgPool, limit: Option<i64>) -> Result<Dashboard, ServiceError> {
    let limit = limit.unwrap_or(DEFAULT_DASHBOARD_MATCHES).clamp(1, MAX_DASHBOARD_MATCHES);
    let games = matches::recent_matches(pool, limit).await?;
    let reconciled = try_join_all(games.into_iter().map(|game| reconcile_match(pool, game))).await?;
    Ok(summarize_dashboard(
        reconciled
            .into_iter()
            .map(|(game, recon)| DashboardEntry { game, totals: recon.totals })
            .collect(),
    ))
}

#[cfg(test)]
#[path = "payments_test.rs"]
mod tests;
