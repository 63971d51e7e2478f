//! Match-changed notifications.
//!
//! DESIGN
//! ======
//! Services publish a [`MatchEvent`] after every successful write that
//! touches a match, its squad, or its payments. Views subscribed through
//! `/api/events` refetch whatever they display for that match. Delivery is
//! best effort: publishing with no subscribers is fine, and a subscriber that
//! falls behind is told to resync instead of replaying missed events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEventKind {
    Created,
    Updated,
    Deleted,
    SquadChanged,
    PaymentRecorded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    pub match_id: Uuid,
    pub kind: MatchEventKind,
    pub at: DateTime<Utc>,
}

impl MatchEvent {
    #[must_use]
    pub fn new(match_id: Uuid, kind: MatchEventKind) -> Self {
        Self { match_id, kind, at: Utc::now() }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MatchEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Returns the number of live subscribers reached.
    pub fn publish(&self, match_id: Uuid, kind: MatchEventKind) -> usize {
        let event = MatchEvent::new(match_id, kind);
        tracing::debug!(%match_id, ?kind, "match event");
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
