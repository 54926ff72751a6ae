//! Storage traits consumed by the worker.
//!
//! Row-level CRUD on three tables (prospects, batch ledgers, contacts) plus
//! the atomic lease claim and an append-only audit log. Implementations:
//! `MemoryStore` (always available) and `PostgresStore` (behind the
//! `postgres` feature).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::selector::SelectionFilter;
use crate::types::batch::{BatchJob, BatchStatus, JobType, StopReason};
use crate::types::contact::{Contact, NewContact};
use crate::types::prospect::{Prospect, ProspectStatus};
use crate::types::report::Report;

/// How a completed attempt lands on the prospect row.
///
/// Applied atomically with the lease release: sets the status, stamps
/// `last_attempt_at`, optionally increments the retry counter.
#[derive(Debug, Clone, Copy)]
pub struct AttemptDisposition {
    pub status: ProspectStatus,
    pub count_retry: bool,
}

/// An audit row recording one status transition.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub entity: &'static str,
    pub entity_id: Uuid,
    pub field: &'static str,
    pub old_value: Option<String>,
    pub new_value: String,
    pub context: String,
}

impl NewAuditEntry {
    /// Entry for a prospect status transition.
    pub fn prospect_status(
        id: Uuid,
        from: ProspectStatus,
        to: ProspectStatus,
        context: impl Into<String>,
    ) -> Self {
        Self {
            entity: "prospect",
            entity_id: id,
            field: "status",
            old_value: Some(from.to_string()),
            new_value: to.to_string(),
            context: context.into(),
        }
    }

    /// Entry for a batch ledger status transition.
    pub fn batch_status(
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
        context: impl Into<String>,
    ) -> Self {
        Self {
            entity: "batch_job",
            entity_id: id,
            field: "status",
            old_value: Some(from.to_string()),
            new_value: to.to_string(),
            context: context.into(),
        }
    }
}

/// A stored audit row.
#[derive(Debug, Clone, serde::Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity: String,
    pub entity_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

/// Work item selection and mutation.
#[async_trait]
pub trait ProspectStore: Send + Sync {
    /// The next eligible prospect under `filter`, or `None`. Read-only and
    /// idempotent: repeated calls without an intervening claim return the
    /// same row.
    async fn next_eligible(
        &self,
        filter: &SelectionFilter,
        now: DateTime<Utc>,
    ) -> Result<Option<Prospect>>;

    /// How many prospects are currently eligible under `filter`.
    async fn count_eligible(&self, filter: &SelectionFilter, now: DateTime<Utc>) -> Result<i64>;

    /// Atomically claim the lease: succeeds only if the lease is free (never
    /// set, released, or expired). On success the prospect moves to
    /// `enriching`. Returns false when another worker holds the lease.
    async fn claim(&self, id: Uuid, token: Uuid, lease_until: DateTime<Utc>) -> Result<bool>;

    /// Finish an attempt: set the final status, stamp `last_attempt_at`,
    /// optionally bump `retry_count`, release the lease. Fails with
    /// `LeaseLost` if `token` no longer holds the lease.
    async fn finish_attempt(
        &self,
        id: Uuid,
        token: Uuid,
        disposition: AttemptDisposition,
    ) -> Result<Prospect>;

    /// Release the lease without recording an attempt, restoring the given
    /// status. Used when a batch-fatal signal interrupts an item. A lost
    /// lease is not an error here.
    async fn release(&self, id: Uuid, token: Uuid, restore_status: ProspectStatus) -> Result<()>;

    /// Clear every `enriching` prospect back to `review` and drop its lease.
    /// Operator repair for frozen batches; returns how many rows moved.
    async fn release_all_enriching(&self) -> Result<u64>;

    async fn create_prospect(&self, report_id: Uuid) -> Result<Prospect>;

    async fn prospect(&self, id: Uuid) -> Result<Option<Prospect>>;

    async fn prospects_for_report(&self, report_id: Uuid) -> Result<Vec<Prospect>>;
}

/// Parent report lookups.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create_report(&self, domain: &str, company_name: Option<&str>) -> Result<Report>;

    async fn report(&self, id: Uuid) -> Result<Option<Report>>;
}

/// Append-only contact records.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert_contact(&self, contact: NewContact) -> Result<Contact>;

    async fn contacts_for_prospect(&self, prospect_id: Uuid) -> Result<Vec<Contact>>;
}

/// Batch ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_ledger(&self, job_type: JobType, total_count: i32) -> Result<BatchJob>;

    async fn ledger(&self, id: Uuid) -> Result<Option<BatchJob>>;

    /// The ledger currently queued or running for this job type, if any.
    async fn active_ledger(&self, job_type: JobType) -> Result<Option<BatchJob>>;

    async fn recent_ledgers(&self, limit: i64) -> Result<Vec<BatchJob>>;

    /// Record one processed item: bump `processed_count` and the matching
    /// outcome counter, set the resume cursor.
    async fn record_item(&self, id: Uuid, success: bool, last_item: Uuid) -> Result<BatchJob>;

    /// Move the ledger to `status`, stamping the matching timestamp.
    /// `stopped_reason` is stored as given (cleared on resume).
    async fn set_ledger_status(
        &self,
        id: Uuid,
        status: BatchStatus,
        stopped_reason: Option<StopReason>,
    ) -> Result<BatchJob>;

    /// Operator repair: zero the counters, restore `queued`, set a fresh
    /// total. The run is expected to be re-triggered afterwards.
    async fn reset_ledger(&self, id: Uuid, total_count: i32) -> Result<BatchJob>;
}

/// Append-only transition log for forensic replay.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()>;

    async fn audit_for(&self, entity_id: Uuid, limit: i64) -> Result<Vec<AuditEntry>>;
}

/// Everything the worker needs from storage.
pub trait EnrichmentStore:
    ProspectStore + ReportStore + ContactStore + LedgerStore + AuditLog
{
}

impl<T> EnrichmentStore for T where
    T: ProspectStore + ReportStore + ContactStore + LedgerStore + AuditLog
{
}
