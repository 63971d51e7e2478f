//! Cost guardrails for AI payment parsing.
//!
//! DESIGN
//! ======
//! Three gates, checked in order before any provider call:
//! - Master kill switch (`AI_SERVICE_ENABLED`)
//! - Free-model whitelist: any model not listed is blocked
//! - Daily request limit, counted per UTC day and reset on date change
//!
//! The counter is in-memory and restarts at zero with the process.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::Serialize;

pub const DEFAULT_DAILY_REQUEST_LIMIT: u32 = 500;

/// Models that run on free tiers. Anything else is refused.
pub const ALLOWED_FREE_MODELS: &[&str] = &[
    "gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro",
    "gemini-1.5-pro-latest",
    "gemini-pro",
    "gemini-pro-vision",
    "gemini-1.5-flash-8b",
    "gemini-2.0-flash-exp",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemma-3-27b-it",
    "google/gemma-3-27b-it:free",
    "google/gemma-2-9b-it:free",
    "meta-llama/llama-3.2-11b-vision-instruct:free",
    "meta-llama/llama-3.2-90b-vision-instruct:free",
];

#[must_use]
pub fn is_model_allowed(model: &str) -> bool {
    ALLOWED_FREE_MODELS.contains(&model)
}

// =============================================================================
// BLOCK REASON
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    #[error("service_disabled")]
    ServiceDisabled,
    #[error("model_not_free")]
    ModelNotFree,
    #[error("daily_limit_exceeded")]
    DailyLimitExceeded,
}

// =============================================================================
// DAILY QUOTA
// =============================================================================

#[derive(Debug)]
struct DayCounter {
    day: NaiveDate,
    count: u32,
}

impl DayCounter {
    fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.count = 0;
        }
    }
}

/// Per-UTC-day request counter shared across handlers.
#[derive(Clone)]
pub struct DailyQuota {
    inner: Arc<Mutex<DayCounter>>,
    limit: u32,
}

impl DailyQuota {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self { inner: Arc::new(Mutex::new(DayCounter { day: today(), count: 0 })), limit }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn requests_today(&self) -> u32 {
        self.requests_on(today())
    }

    fn requests_on(&self, day: NaiveDate) -> u32 {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.roll(day);
        inner.count
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.requests_today())
    }

    #[must_use]
    pub fn is_within_limit(&self) -> bool {
        self.requests_today() < self.limit
    }

    /// Check the limit and count the request under one lock. Returns the new
    /// total, or `None` when today's limit is already used up.
    pub fn try_acquire(&self) -> Option<u32> {
        self.try_acquire_on(today())
    }

    fn try_acquire_on(&self, day: NaiveDate) -> Option<u32> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.roll(day);
        if inner.count >= self.limit {
            return None;
        }
        inner.count += 1;
        Some(inner.count)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// =============================================================================
// GUARDRAILS
// =============================================================================

#[derive(Clone)]
pub struct Guardrails {
    enabled: bool,
    quota: DailyQuota,
}

impl Guardrails {
    #[must_use]
    pub fn new(enabled: bool, daily_limit: u32) -> Self {
        Self { enabled, quota: DailyQuota::new(daily_limit) }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn quota(&self) -> &DailyQuota {
        &self.quota
    }

    /// Decide whether a call to `model` must be refused.
    #[must_use]
    pub fn should_block(&self, model: &str) -> Option<BlockReason> {
        if !self.enabled {
            return Some(BlockReason::ServiceDisabled);
        }
        if !is_model_allowed(model) {
            return Some(BlockReason::ModelNotFree);
        }
        if !self.quota.is_within_limit() {
            return Some(BlockReason::DailyLimitExceeded);
        }
        None
    }

    /// Final gate before a provider call: same checks as [`Self::should_block`],
    /// with the quota slot taken atomically. Returns today's request count.
    ///
    /// # Errors
    ///
    /// Returns the [`BlockReason`] when the call must not go out.
    pub fn admit(&self, model: &str) -> Result<u32, BlockReason> {
        if !self.enabled {
            return Err(BlockReason::ServiceDisabled);
        }
        if !is_model_allowed(model) {
            return Err(BlockReason::ModelNotFree);
        }
        self.quota.try_acquire().ok_or(BlockReason::DailyLimitExceeded)
    }
}

#[cfg(test)]
#[path = "quota_test.rs"]
mod tests;
