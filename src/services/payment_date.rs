//! Payment date checks against the match date.
//!
//! A payment dated before the match is suspicious (a reused screenshot, a
//! misread date, or a prepayment) and goes to review. Dates that cannot be
//! read never block a payment.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b, %Y",
    "%d %B, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse the common date renderings found on UPI receipts and in ISO
/// timestamps. Returns `None` when nothing matches.
#[must_use]
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // "2024-01-15 at 10:30 pm" and similar: honour a leading ISO date.
    s.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCheck {
    Valid,
    /// Payment predates the match.
    Mismatch,
}

/// Compare a payment date with the match date.
#[must_use]
pub fn validate_payment_date(payment_date: &str, match_date: &str) -> DateCheck {
    let (Some(payment), Some(matched)) = (parse_loose_date(payment_date), parse_loose_date(match_date)) else {
        if !payment_date.trim().is_empty() && !match_date.trim().is_empty() {
            tracing::warn!(payment_date, match_date, "could not parse dates; skipping check");
        }
        return DateCheck::Valid;
    };
    if payment < matched {
        tracing::warn!(%payment, %matched, "payment date is older than match date");
        DateCheck::Mismatch
    } else {
        DateCheck::Valid
    }
}

/// Days from the match to the payment; positive when paid after the match.
#[must_use]
pub fn days_between(payment_date: &str, match_date: &str) -> Option<i64> {
    let payment = parse_loose_date(payment_date)?;
    let matched = parse_loose_date(match_date)?;
    Some((payment - matched).num_days())
}
