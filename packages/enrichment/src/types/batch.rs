//! Batch job ledger - durable record of one run's progress and control state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnrichmentError;
use crate::selector::SelectionFilter;

/// A running batch with no ledger update for longer than this is considered
/// frozen and surfaced to operators for manual repair.
pub const FROZEN_AFTER_MINUTES: i64 = 10;

/// Ledger status.
///
/// State machine: `queued -> running -> {paused <-> running} -> {completed | failed}`.
/// Only `paused` and `running` are bidirectionally reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "batch_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Running => "running",
            BatchStatus::Paused => "paused",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a batch stopped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "stop_reason", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    UserPaused,
    RateLimit,
    CreditsExhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::UserPaused => "user_paused",
            StopReason::RateLimit => "rate_limit",
            StopReason::CreditsExhausted => "credits_exhausted",
        }
    }
}

/// The kind of batch run, which determines the selection filter.
///
/// At most one ledger per job type may be running at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    /// Normal enrichment over `new` and `review` prospects.
    Enrich,
    /// Re-enrichment pass restricted to `review` prospects.
    ReEnrich,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Enrich => "enrich",
            JobType::ReEnrich => "re_enrich",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EnrichmentError> {
        match s {
            "enrich" => Ok(JobType::Enrich),
            "re_enrich" => Ok(JobType::ReEnrich),
            other => Err(EnrichmentError::UnknownJobType(other.to_string())),
        }
    }

    /// The selection filter this kind of run uses.
    pub fn filter(&self) -> SelectionFilter {
        match self {
            JobType::Enrich => SelectionFilter::standard(),
            JobType::ReEnrich => SelectionFilter::review_only(),
        }
    }
}

/// Durable record of one batch run.
///
/// Counters obey `success_count + failure_count <= processed_count <= total_count`
/// at every observed point. Updated after every processed item so progress
/// survives interruption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct BatchJob {
    pub id: Uuid,
    pub job_type: String,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub status: BatchStatus,
    pub stopped_reason: Option<StopReason>,
    pub last_processed_item_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    /// A fresh queued ledger.
    pub fn new(job_type: JobType, total_count: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.as_str().to_string(),
            total_count,
            processed_count: 0,
            success_count: 0,
            failure_count: 0,
            status: BatchStatus::Queued,
            stopped_reason: None,
            last_processed_item_id: None,
            started_at: None,
            paused_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the state machine allows moving from the current status to `to`.
    pub fn can_transition(&self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self.status, to),
            (Queued, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }

    /// Running but not updated for over ten minutes; needs operator repair.
    pub fn is_frozen(&self, now: DateTime<Utc>) -> bool {
        self.status == BatchStatus::Running
            && now - self.updated_at > Duration::minutes(FROZEN_AFTER_MINUTES)
    }

    /// Human-readable progress line, distinguishing the pause causes.
    pub fn progress_message(&self) -> String {
        match (self.status, self.stopped_reason) {
            (BatchStatus::Paused, Some(StopReason::UserPaused)) => format!(
                "paused by user at {}/{}",
                self.processed_count, self.total_count
            ),
            (BatchStatus::Paused, Some(StopReason::RateLimit)) => format!(
                "paused at {}/{} - provider rate limit hit, retry later",
                self.processed_count, self.total_count
            ),
            (BatchStatus::Paused, Some(StopReason::CreditsExhausted)) => format!(
                "paused at {}/{} - search credits exhausted, add funds to continue",
                self.processed_count, self.total_count
            ),
            (BatchStatus::Completed, _) => format!(
                "completed: {} succeeded, {} failed",
                self.success_count, self.failure_count
            ),
            (BatchStatus::Failed, _) => format!(
                "failed at {}/{}",
                self.processed_count, self.total_count
            ),
            (status, _) => format!(
                "{}: {}/{} processed",
                status, self.processed_count, self.total_count
            ),
        }
    }
}

/// Summary of one trigger invocation, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub job_id: Uuid,
    pub processed: i32,
    pub successful: i32,
    pub failed: i32,
    pub status: BatchStatus,
    pub stopped_reason: Option<StopReason>,
}

impl BatchOutcome {
    pub fn from_job(job: &BatchJob) -> Self {
        Self {
            job_id: job.id,
            processed: job.processed_count,
            successful: job.success_count,
            failed: job.failure_count,
            status: job.status,
            stopped_reason: job.stopped_reason,
        }
    }
}
