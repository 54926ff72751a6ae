//! PostgreSQL storage implementation.
//!
//! The selection predicate and the lease claim are expressed directly in
//! SQL so they stay atomic under concurrent workers: the claim is a
//! conditional `UPDATE` that only lands while the lease is free, and the
//! backoff window is the same fixed table the in-memory selector uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::error::{EnrichmentError, Result};
use crate::selector::SelectionFilter;
use crate::traits::store::{
    AttemptDisposition, AuditEntry, AuditLog, ContactStore, LedgerStore, NewAuditEntry,
    ProspectStore, ReportStore,
};
use crate::types::batch::{BatchJob, BatchStatus, JobType, StopReason};
use crate::types::contact::{Contact, NewContact};
use crate::types::prospect::{Prospect, ProspectStatus};
use crate::types::report::Report;

/// The backoff table from `selector::BACKOFF_SECONDS`, as a SQL fragment.
const BACKOFF_CASE: &str = r#"
    CASE retry_count
        WHEN 0 THEN INTERVAL '0 seconds'
        WHEN 1 THEN INTERVAL '30 minutes'
        WHEN 2 THEN INTERVAL '2 hours'
        ELSE INTERVAL '24 hours'
    END
"#;

/// PostgreSQL-backed enrichment store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn status_strings(filter: &SelectionFilter) -> Vec<String> {
        filter.statuses.iter().map(|s| s.to_string()).collect()
    }

    fn eligibility_clause() -> String {
        format!(
            r#"
            status::text = ANY($1)
            AND retry_count < $2
            AND (lock_token IS NULL OR lock_expires_at < $3)
            AND (last_attempt_at IS NULL OR last_attempt_at <= $3 - ({BACKOFF_CASE}))
            "#
        )
    }
}

#[async_trait]
impl ProspectStore for PostgresStore {
    async fn next_eligible(
        &self,
        filter: &SelectionFilter,
        now: DateTime<Utc>,
    ) -> Result<Option<Prospect>> {
        let sql = format!(
            r#"
            SELECT * FROM prospects
            WHERE {}
            ORDER BY last_attempt_at ASC NULLS FIRST, created_at ASC, id ASC
            LIMIT 1
            "#,
            Self::eligibility_clause()
        );

        let prospect = sqlx::query_as::<_, Prospect>(&sql)
            .bind(Self::status_strings(filter))
            .bind(filter.retry_ceiling)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(prospect)
    }

    async fn count_eligible(&self, filter: &SelectionFilter, now: DateTime<Utc>) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM prospects WHERE {}",
            Self::eligibility_clause()
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(Self::status_strings(filter))
            .bind(filter.retry_ceiling)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn claim(&self, id: Uuid, token: Uuid, lease_until: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE prospects
            SET lock_token = $2,
                lock_expires_at = $3,
                status = 'enriching',
                updated_at = NOW()
            WHERE id = $1
              AND (lock_token IS NULL OR lock_expires_at < NOW())
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(lease_until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn finish_attempt(
        &self,
        id: Uuid,
        token: Uuid,
        disposition: AttemptDisposition,
    ) -> Result<Prospect> {
        let prospect = sqlx::query_as::<_, Prospect>(
            r#"
            UPDATE prospects
            SET status = $3,
                retry_count = retry_count + $4,
                last_attempt_at = NOW(),
                lock_token = NULL,
                lock_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND lock_token = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(disposition.status)
        .bind(if disposition.count_retry { 1i32 } else { 0i32 })
        .fetch_optional(&self.pool)
        .await?;

        prospect.ok_or(EnrichmentError::LeaseLost { id })
    }

    async fn release(&self, id: Uuid, token: Uuid, restore_status: ProspectStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE prospects
            SET status = $3,
                lock_token = NULL,
                lock_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND lock_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(restore_status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_all_enriching(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE prospects
            SET status = 'review',
                lock_token = NULL,
                lock_expires_at = NULL,
                updated_at = NOW()
            WHERE status = 'enriching'
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_prospect(&self, report_id: Uuid) -> Result<Prospect> {
        let prospect = sqlx::query_as::<_, Prospect>(
            r#"
            INSERT INTO prospects (report_id)
            VALUES ($1)
            RETURNING *
            "#,
        )
        .bind(report_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(prospect)
    }

    async fn prospect(&self, id: Uuid) -> Result<Option<Prospect>> {
        let prospect = sqlx::query_as::<_, Prospect>("SELECT * FROM prospects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(prospect)
    }

    async fn prospects_for_report(&self, report_id: Uuid) -> Result<Vec<Prospect>> {
        let prospects = sqlx::query_as::<_, Prospect>(
            "SELECT * FROM prospects WHERE report_id = $1 ORDER BY created_at ASC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prospects)
    }
}

#[async_trait]
impl ReportStore for PostgresStore {
    async fn create_report(&self, domain: &str, company_name: Option<&str>) -> Result<Report> {
        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (domain, company_name)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(domain)
        .bind(company_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(report)
    }

    async fn report(&self, id: Uuid) -> Result<Option<Report>> {
        let report = sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(report)
    }
}

#[async_trait]
impl ContactStore for PostgresStore {
    async fn insert_contact(&self, contact: NewContact) -> Result<Contact> {
        let stored = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts
                (prospect_id, report_id, first_name, last_name, email, phone,
                 source_note, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(contact.prospect_id)
        .bind(contact.report_id)
        .bind(contact.first_name)
        .bind(contact.last_name)
        .bind(contact.email)
        .bind(contact.phone)
        .bind(contact.source_note)
        .bind(contact.is_primary)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn contacts_for_prospect(&self, prospect_id: Uuid) -> Result<Vec<Contact>> {
        let contacts = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE prospect_id = $1 ORDER BY created_at ASC",
        )
        .bind(prospect_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn create_ledger(&self, job_type: JobType, total_count: i32) -> Result<BatchJob> {
        let job = sqlx::query_as::<_, BatchJob>(
            r#"
            INSERT INTO batch_jobs (job_type, total_count)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(job_type.as_str())
        .bind(total_count)
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }

    async fn ledger(&self, id: Uuid) -> Result<Option<BatchJob>> {
        let job = sqlx::query_as::<_, BatchJob>("SELECT * FROM batch_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn active_ledger(&self, job_type: JobType) -> Result<Option<BatchJob>> {
        let job = sqlx::query_as::<_, BatchJob>(
            r#"
            SELECT * FROM batch_jobs
            WHERE job_type = $1
              AND status IN ('queued', 'running')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn recent_ledgers(&self, limit: i64) -> Result<Vec<BatchJob>> {
        let jobs = sqlx::query_as::<_, BatchJob>(
            "SELECT * FROM batch_jobs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn record_item(&self, id: Uuid, success: bool, last_item: Uuid) -> Result<BatchJob> {
        let job = sqlx::query_as::<_, BatchJob>(
            r#"
            UPDATE batch_jobs
            SET processed_count = processed_count + 1,
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_processed_item_id = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(success)
        .bind(last_item)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or(EnrichmentError::LedgerNotFound { id })
    }

    async fn set_ledger_status(
        &self,
        id: Uuid,
        status: BatchStatus,
        stopped_reason: Option<StopReason>,
    ) -> Result<BatchJob> {
        let job = sqlx::query_as::<_, BatchJob>(
            r#"
            UPDATE batch_jobs
            SET status = $2,
                stopped_reason = $3,
                started_at = CASE WHEN $2 = 'running' THEN COALESCE(started_at, NOW()) ELSE started_at END,
                paused_at = CASE WHEN $2 = 'paused' THEN NOW() ELSE paused_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(stopped_reason)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or(EnrichmentError::LedgerNotFound { id })
    }

    async fn reset_ledger(&self, id: Uuid, total_count: i32) -> Result<BatchJob> {
        let job = sqlx::query_as::<_, BatchJob>(
            r#"
            UPDATE batch_jobs
            SET status = 'queued',
                total_count = $2,
                processed_count = 0,
                success_count = 0,
                failure_count = 0,
                stopped_reason = NULL,
                last_processed_item_id = NULL,
                started_at = NULL,
                paused_at = NULL,
                completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(total_count)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or(EnrichmentError::LedgerNotFound { id })
    }
}

#[async_trait]
impl AuditLog for PostgresStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (entity, entity_id, field, old_value, new_value, context)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.entity)
        .bind(entry.entity_id)
        .bind(entry.field)
        .bind(entry.old_value)
        .bind(entry.new_value)
        .bind(entry.context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_for(&self, entity_id: Uuid, limit: i64) -> Result<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_log
            WHERE entity_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
