//! Prospect model - one unit of enrichment work, tied to a report domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prospect lifecycle status.
///
/// `Enriched`, `NotViable` and `EnrichmentFailed` are terminal: a prospect
/// in one of these states is never selected for work again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "prospect_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStatus {
    New,
    Enriching,
    Review,
    Enriched,
    EnrichmentFailed,
    NotViable,
}

impl ProspectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProspectStatus::New => "new",
            ProspectStatus::Enriching => "enriching",
            ProspectStatus::Review => "review",
            ProspectStatus::Enriched => "enriched",
            ProspectStatus::EnrichmentFailed => "enrichment_failed",
            ProspectStatus::NotViable => "not_viable",
        }
    }

    /// Terminal statuses are excluded from all future selection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProspectStatus::Enriched
                | ProspectStatus::EnrichmentFailed
                | ProspectStatus::NotViable
        )
    }
}

impl std::fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of enrichment work.
///
/// The lease pair (`lock_token`, `lock_expires_at`) is the only mutual
/// exclusion primitive: a prospect whose lease has expired counts as free,
/// so a crashed worker's claim self-expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Prospect {
    pub id: Uuid,
    pub report_id: Uuid,
    pub status: ProspectStatus,
    pub retry_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub lock_token: Option<Uuid>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    /// A fresh, unlocked prospect in `new` status.
    pub fn new(report_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            report_id,
            status: ProspectStatus::New,
            retry_count: 0,
            last_attempt_at: None,
            lock_token: None,
            lock_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the lease is currently held (set and not yet expired).
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        match (self.lock_token, self.lock_expires_at) {
            (Some(_), Some(expires)) => expires > now,
            _ => false,
        }
    }
}
