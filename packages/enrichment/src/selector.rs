//! Work selection: eligibility filtering and the retry backoff schedule.
//!
//! The selector is read-only. Storage backends apply the same predicate in
//! their own query language; [`is_eligible`] is the reference implementation
//! used by the in-memory store and the tests.

use chrono::{DateTime, Duration, Utc};

use crate::types::prospect::{Prospect, ProspectStatus};

/// Attempts after which a prospect becomes terminal.
pub const RETRY_CEILING: i32 = 3;

/// Wait before a prospect becomes eligible again, indexed by `retry_count`.
///
/// A fixed lookup table, not a computed exponential. Entries past the end
/// clamp to the last value.
pub const BACKOFF_SECONDS: [i64; 4] = [0, 30 * 60, 2 * 60 * 60, 24 * 60 * 60];

/// Backoff duration for a given retry count.
pub fn backoff_for(retry_count: i32) -> Duration {
    let idx = (retry_count.max(0) as usize).min(BACKOFF_SECONDS.len() - 1);
    Duration::seconds(BACKOFF_SECONDS[idx])
}

/// Which prospects a batch run considers.
#[derive(Debug, Clone)]
pub struct SelectionFilter {
    pub statuses: Vec<ProspectStatus>,
    pub retry_ceiling: i32,
}

impl SelectionFilter {
    /// Normal enrichment: fresh prospects plus those queued for another pass.
    pub fn standard() -> Self {
        Self {
            statuses: vec![ProspectStatus::New, ProspectStatus::Review],
            retry_ceiling: RETRY_CEILING,
        }
    }

    /// Re-enrichment pass restricted to prospects awaiting review.
    pub fn review_only() -> Self {
        Self {
            statuses: vec![ProspectStatus::Review],
            retry_ceiling: RETRY_CEILING,
        }
    }
}

/// The selection predicate: status allowed, retries below ceiling, lease
/// free, and the backoff window for the current retry count elapsed.
pub fn is_eligible(prospect: &Prospect, filter: &SelectionFilter, now: DateTime<Utc>) -> bool {
    if !filter.statuses.contains(&prospect.status) {
        return false;
    }
    if prospect.retry_count >= filter.retry_ceiling {
        return false;
    }
    if prospect.is_leased(now) {
        return false;
    }
    match prospect.last_attempt_at {
        None => true,
        Some(last) => now - last >= backoff_for(prospect.retry_count),
    }
}

/// Ordering for fairness: oldest attempt first, never-attempted first of all.
/// Creation time breaks ties so the order is deterministic.
pub fn selection_order(a: &Prospect, b: &Prospect) -> std::cmp::Ordering {
    match (a.last_attempt_at, b.last_attempt_at) {
        (None, None) => {}
        (None, Some(_)) => return std::cmp::Ordering::Less,
        (Some(_), None) => return std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => match x.cmp(&y) {
            std::cmp::Ordering::Equal => {}
            other => return other,
        },
    }
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}
