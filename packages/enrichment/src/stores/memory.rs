//! In-memory storage implementation.
//!
//! Backs the test suite and local experiments. Mutual exclusion comes from
//! the interior `RwLock`: the claim check-and-set runs under the write
//! lock, so concurrent claims serialize exactly like the SQL backend's
//! conditional `UPDATE`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EnrichmentError, Result};
use crate::selector::{is_eligible, selection_order, SelectionFilter};
use crate::traits::store::{
    AttemptDisposition, AuditEntry, AuditLog, ContactStore, LedgerStore, NewAuditEntry,
    ProspectStore, ReportStore,
};
use crate::types::batch::{BatchJob, BatchStatus, JobType, StopReason};
use crate::types::contact::{Contact, NewContact};
use crate::types::prospect::{Prospect, ProspectStatus};
use crate::types::report::Report;

#[derive(Default)]
struct Inner {
    reports: HashMap<Uuid, Report>,
    prospects: HashMap<Uuid, Prospect>,
    ledgers: HashMap<Uuid, BatchJob>,
    contacts: Vec<Contact>,
    audit: Vec<AuditEntry>,
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a report directly (test setup).
    pub fn seed_report(&self, report: Report) {
        self.inner.write().unwrap().reports.insert(report.id, report);
    }

    /// Seed a prospect directly (test setup).
    pub fn seed_prospect(&self, prospect: Prospect) {
        self.inner
            .write()
            .unwrap()
            .prospects
            .insert(prospect.id, prospect);
    }

    /// Number of stored audit rows (test assertions).
    pub fn audit_len(&self) -> usize {
        self.inner.read().unwrap().audit.len()
    }
}

#[async_trait]
impl ProspectStore for MemoryStore {
    async fn next_eligible(
        &self,
        filter: &SelectionFilter,
        now: DateTime<Utc>,
    ) -> Result<Option<Prospect>> {
        let inner = self.inner.read().unwrap();
        let mut eligible: Vec<&Prospect> = inner
            .prospects
            .values()
            .filter(|p| is_eligible(p, filter, now))
            .collect();
        eligible.sort_by(|a, b| selection_order(a, b));
        Ok(eligible.first().map(|p| (*p).clone()))
    }

    async fn count_eligible(&self, filter: &SelectionFilter, now: DateTime<Utc>) -> Result<i64> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .prospects
            .values()
            .filter(|p| is_eligible(p, filter, now))
            .count() as i64)
    }

    async fn claim(&self, id: Uuid, token: Uuid, lease_until: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let prospect = inner
            .prospects
            .get_mut(&id)
            .ok_or(EnrichmentError::ProspectNotFound { id })?;

        if prospect.is_leased(Utc::now()) {
            return Ok(false);
        }

        prospect.lock_token = Some(token);
        prospect.lock_expires_at = Some(lease_until);
        prospect.status = ProspectStatus::Enriching;
        prospect.updated_at = Utc::now();
        Ok(true)
    }

    async fn finish_attempt(
        &self,
        id: Uuid,
        token: Uuid,
        disposition: AttemptDisposition,
    ) -> Result<Prospect> {
        let mut inner = self.inner.write().unwrap();
        let prospect = inner
            .prospects
            .get_mut(&id)
            .ok_or(EnrichmentError::ProspectNotFound { id })?;

        if prospect.lock_token != Some(token) {
            return Err(EnrichmentError::LeaseLost { id });
        }

        prospect.status = disposition.status;
        if disposition.count_retry {
            prospect.retry_count += 1;
        }
        prospect.last_attempt_at = Some(Utc::now());
        prospect.lock_token = None;
        prospect.lock_expires_at = None;
        prospect.updated_at = Utc::now();
        Ok(prospect.clone())
    }

    async fn release(&self, id: Uuid, token: Uuid, restore_status: ProspectStatus) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let Some(prospect) = inner.prospects.get_mut(&id) else {
            return Ok(());
        };
        if prospect.lock_token != Some(token) {
            return Ok(());
        }
        prospect.status = restore_status;
        prospect.lock_token = None;
        prospect.lock_expires_at = None;
        prospect.updated_at = Utc::now();
        Ok(())
    }

    async fn release_all_enriching(&self) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut moved = 0;
        for prospect in inner.prospects.values_mut() {
            if prospect.status == ProspectStatus::Enriching {
                prospect.status = ProspectStatus::Review;
                prospect.lock_token = None;
                prospect.lock_expires_at = None;
                prospect.updated_at = Utc::now();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn create_prospect(&self, report_id: Uuid) -> Result<Prospect> {
        let prospect = Prospect::new(report_id);
        self.inner
            .write()
            .unwrap()
            .prospects
            .insert(prospect.id, prospect.clone());
        Ok(prospect)
    }

    async fn prospect(&self, id: Uuid) -> Result<Option<Prospect>> {
        Ok(self.inner.read().unwrap().prospects.get(&id).cloned())
    }

    async fn prospects_for_report(&self, report_id: Uuid) -> Result<Vec<Prospect>> {
        let inner = self.inner.read().unwrap();
        let mut prospects: Vec<Prospect> = inner
            .prospects
            .values()
            .filter(|p| p.report_id == report_id)
            .cloned()
            .collect();
        prospects.sort_by_key(|p| p.created_at);
        Ok(prospects)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create_report(&self, domain: &str, company_name: Option<&str>) -> Result<Report> {
        let report = Report::new(domain, company_name.map(|s| s.to_string()));
        self.inner
            .write()
            .unwrap()
            .reports
            .insert(report.id, report.clone());
        Ok(report)
    }

    async fn report(&self, id: Uuid) -> Result<Option<Report>> {
        Ok(self.inner.read().unwrap().reports.get(&id).cloned())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn insert_contact(&self, contact: NewContact) -> Result<Contact> {
        let stored = Contact {
            id: Uuid::new_v4(),
            prospect_id: contact.prospect_id,
            report_id: contact.report_id,
            first_name: contact.first_name,
            last_name: contact.last_name,
            email: contact.email,
            phone: contact.phone,
            source_note: contact.source_note,
            is_primary: contact.is_primary,
            created_at: Utc::now(),
        };
        self.inner.write().unwrap().contacts.push(stored.clone());
        Ok(stored)
    }

    async fn contacts_for_prospect(&self, prospect_id: Uuid) -> Result<Vec<Contact>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .contacts
            .iter()
            .filter(|c| c.prospect_id == prospect_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_ledger(&self, job_type: JobType, total_count: i32) -> Result<BatchJob> {
        let job = BatchJob::new(job_type, total_count);
        self.inner
            .write()
            .unwrap()
            .ledgers
            .insert(job.id, job.clone());
        Ok(job)
    }

    async fn ledger(&self, id: Uuid) -> Result<Option<BatchJob>> {
        Ok(self.inner.read().unwrap().ledgers.get(&id).cloned())
    }

    async fn active_ledger(&self, job_type: JobType) -> Result<Option<BatchJob>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .ledgers
            .values()
            .find(|j| {
                j.job_type == job_type.as_str()
                    && matches!(j.status, BatchStatus::Queued | BatchStatus::Running)
            })
            .cloned())
    }

    async fn recent_ledgers(&self, limit: i64) -> Result<Vec<BatchJob>> {
        let inner = self.inner.read().unwrap();
        let mut jobs: Vec<BatchJob> = inner.ledgers.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit as usize);
        Ok(jobs)
    }

    async fn record_item(&self, id: Uuid, success: bool, last_item: Uuid) -> Result<BatchJob> {
        let mut inner = self.inner.write().unwrap();
        let job = inner
            .ledgers
            .get_mut(&id)
            .ok_or(EnrichmentError::LedgerNotFound { id })?;

        job.processed_count += 1;
        if success {
            job.success_count += 1;
        } else {
            job.failure_count += 1;
        }
        job.last_processed_item_id = Some(last_item);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn set_ledger_status(
        &self,
        id: Uuid,
        status: BatchStatus,
        stopped_reason: Option<StopReason>,
    ) -> Result<BatchJob> {
        let mut inner = self.inner.write().unwrap();
        let job = inner
            .ledgers
            .get_mut(&id)
            .ok_or(EnrichmentError::LedgerNotFound { id })?;

        let now = Utc::now();
        job.status = status;
        job.stopped_reason = stopped_reason;
        match status {
            BatchStatus::Running => {
                job.started_at.get_or_insert(now);
            }
            BatchStatus::Paused => {
                job.paused_at = Some(now);
            }
            BatchStatus::Completed | BatchStatus::Failed => {
                job.completed_at = Some(now);
            }
            BatchStatus::Queued => {}
        }
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn reset_ledger(&self, id: Uuid, total_count: i32) -> Result<BatchJob> {
        let mut inner = self.inner.write().unwrap();
        let job = inner
            .ledgers
            .get_mut(&id)
            .ok_or(EnrichmentError::LedgerNotFound { id })?;

        job.status = BatchStatus::Queued;
        job.total_count = total_count;
        job.processed_count = 0;
        job.success_count = 0;
        job.failure_count = 0;
        job.stopped_reason = None;
        job.last_processed_item_id = None;
        job.started_at = None;
        job.paused_at = None;
        job.completed_at = None;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<()> {
        let stored = AuditEntry {
            id: Uuid::new_v4(),
            entity: entry.entity.to_string(),
            entity_id: entry.entity_id,
            field: entry.field.to_string(),
            old_value: entry.old_value,
            new_value: entry.new_value,
            context: entry.context,
            created_at: Utc::now(),
        };
        self.inner.write().unwrap().audit.push(stored);
        Ok(())
    }

    async fn audit_for(&self, entity_id: Uuid, limit: i64) -> Result<Vec<AuditEntry>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .audit
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn claim_is_exclusive() {
        let store = MemoryStore::new();
        let report = store.create_report("acme.com", None).await.unwrap();
        let prospect = store.create_prospect(report.id).await.unwrap();

        let until = Utc::now() + Duration::minutes(10);
        let (a, b) = tokio::join!(
            store.claim(prospect.id, Uuid::new_v4(), until),
            store.claim(prospect.id, Uuid::new_v4(), until),
        );
        // Exactly one winner, one no-op skip.
        assert!(a.unwrap() ^ b.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_claimable() {
        let store = MemoryStore::new();
        let report = store.create_report("acme.com", None).await.unwrap();
        let prospect = store.create_prospect(report.id).await.unwrap();

        let stale = Utc::now() - Duration::minutes(1);
        assert!(store
            .claim(prospect.id, Uuid::new_v4(), stale)
            .await
            .unwrap());

        // First lease already expired, so a new claim wins.
        let fresh = Utc::now() + Duration::minutes(10);
        assert!(store
            .claim(prospect.id, Uuid::new_v4(), fresh)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn selection_is_idempotent_without_claim() {
        let store = MemoryStore::new();
        let report = store.create_report("acme.com", None).await.unwrap();
        store.create_prospect(report.id).await.unwrap();
        store.create_prospect(report.id).await.unwrap();

        let filter = SelectionFilter::standard();
        let now = Utc::now();
        let first = store.next_eligible(&filter, now).await.unwrap().unwrap();
        let second = store.next_eligible(&filter, now).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn finish_attempt_requires_the_lease() {
        let store = MemoryStore::new();
        let report = store.create_report("acme.com", None).await.unwrap();
        let prospect = store.create_prospect(report.id).await.unwrap();

        let token = Uuid::new_v4();
        let until = Utc::now() + Duration::minutes(10);
        assert!(store.claim(prospect.id, token, until).await.unwrap());

        let wrong = Uuid::new_v4();
        let err = store
            .finish_attempt(
                prospect.id,
                wrong,
                AttemptDisposition {
                    status: ProspectStatus::Enriched,
                    count_retry: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::LeaseLost { .. }));

        let updated = store
            .finish_attempt(
                prospect.id,
                token,
                AttemptDisposition {
                    status: ProspectStatus::Review,
                    count_retry: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ProspectStatus::Review);
        assert_eq!(updated.retry_count, 1);
        assert!(updated.lock_token.is_none());
    }
}
