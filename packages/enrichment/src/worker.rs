//! The enrichment worker: per-item staged search plus the batch loop.
//!
//! One logical worker processes items strictly sequentially. The loop
//! checks a cooperative pause token between items (never mid-item), sleeps
//! a fixed delay after each item to respect provider rate limits, and
//! persists ledger counters after every item so progress survives
//! interruption. A 429/402 from the provider aborts the remaining batch and
//! parks the ledger in `paused` with a machine-readable stop reason.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EnrichmentError, Result, SearchError};
use crate::parse::{extract_valid_emails, parse_full_name, FullName};
use crate::stages::{StagePlan, StagePurpose};
use crate::traits::searcher::Searcher;
use crate::traits::store::{AttemptDisposition, EnrichmentStore, NewAuditEntry};
use crate::types::batch::{BatchJob, BatchOutcome, BatchStatus, JobType, StopReason};
use crate::types::config::WorkerConfig;
use crate::types::contact::NewContact;
use crate::types::prospect::{Prospect, ProspectStatus};
use crate::types::report::Report;

/// A validated address plus the stage that produced it.
#[derive(Debug, Clone)]
struct FoundEmail {
    email: String,
    stage: &'static str,
}

/// What the staged queries turned up for one prospect.
#[derive(Debug, Default)]
struct StageFindings {
    name: Option<FullName>,
    emails: Vec<FoundEmail>,
}

/// Outcome of one item attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Contacts persisted, prospect enriched.
    Enriched { contacts: usize },
    /// No results; prospect re-queued for a later pass.
    Retry,
    /// No results and the retry ceiling was reached; prospect is terminal.
    Exhausted,
    /// Lease lost to another worker mid-attempt; item not counted.
    Skipped,
}

impl ItemOutcome {
    fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Enriched { .. })
    }
}

/// The enrichment worker. Generic over storage, dynamic over the provider.
pub struct EnrichmentWorker<S> {
    store: Arc<S>,
    searcher: Arc<dyn Searcher>,
    plan: StagePlan,
    config: WorkerConfig,
}

impl<S: EnrichmentStore> EnrichmentWorker<S> {
    pub fn new(store: Arc<S>, searcher: Arc<dyn Searcher>) -> Self {
        Self {
            store,
            searcher,
            plan: StagePlan::standard(),
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_plan(mut self, plan: StagePlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create the ledger for a new batch. Refuses while another ledger of
    /// the same job type is queued or running.
    pub async fn start_batch(&self, job_type: JobType) -> Result<BatchJob> {
        if let Some(existing) = self.store.active_ledger(job_type).await? {
            return Err(EnrichmentError::BatchAlreadyRunning {
                job_type: job_type.as_str().to_string(),
                id: existing.id,
            });
        }

        let filter = job_type.filter();
        let mut total = self.store.count_eligible(&filter, Utc::now()).await?;
        if let Some(cap) = self.config.max_batch_size {
            total = total.min(cap);
        }

        let job = self.store.create_ledger(job_type, total as i32).await?;
        info!(job_id = %job.id, job_type = %job.job_type, total = job.total_count, "batch created");
        Ok(job)
    }

    /// Run (or resume) a batch to its next stopping point: completion,
    /// pause, provider abort, or storage failure.
    pub async fn run_batch(&self, job_id: Uuid, pause: CancellationToken) -> Result<BatchOutcome> {
        let job = self
            .store
            .ledger(job_id)
            .await?
            .ok_or(EnrichmentError::LedgerNotFound { id: job_id })?;

        if !job.can_transition(BatchStatus::Running) {
            return Err(EnrichmentError::InvalidTransition {
                from: job.status,
                to: BatchStatus::Running,
            });
        }

        let job_type = JobType::parse(&job.job_type)?;
        let filter = job_type.filter();
        let resuming = job.status == BatchStatus::Paused;

        let old_status = job.status;
        let mut job = self
            .store
            .set_ledger_status(job.id, BatchStatus::Running, None)
            .await?;
        self.store
            .append_audit(NewAuditEntry::batch_status(
                job.id,
                old_status,
                BatchStatus::Running,
                if resuming {
                    format!("batch resumed at {}/{}", job.processed_count, job.total_count)
                } else {
                    format!("batch started over {} eligible prospects", job.total_count)
                },
            ))
            .await?;

        info!(
            job_id = %job.id,
            processed = job.processed_count,
            total = job.total_count,
            resuming,
            "batch running"
        );

        loop {
            // The only cancellation point: between items.
            if pause.is_cancelled() {
                job = self.stop(job, BatchStatus::Paused, Some(StopReason::UserPaused)).await?;
                break;
            }

            if job.processed_count >= job.total_count {
                job = self.stop(job, BatchStatus::Completed, None).await?;
                break;
            }

            let now = Utc::now();
            let Some(prospect) = self.store.next_eligible(&filter, now).await? else {
                job = self.stop(job, BatchStatus::Completed, None).await?;
                break;
            };

            let token = Uuid::new_v4();
            let lease_until = now + self.config.lease_duration;
            if !self.store.claim(prospect.id, token, lease_until).await? {
                // Another worker owns it; not an error, no retry penalty.
                debug!(prospect_id = %prospect.id, "claim lost, skipping");
                continue;
            }
            self.store
                .append_audit(NewAuditEntry::prospect_status(
                    prospect.id,
                    prospect.status,
                    ProspectStatus::Enriching,
                    "claimed for enrichment",
                ))
                .await?;

            match self.attempt(&prospect, token).await {
                Ok(ItemOutcome::Skipped) => {}
                Ok(outcome) => {
                    job = self
                        .store
                        .record_item(job.id, outcome.is_success(), prospect.id)
                        .await?;
                }
                Err(e) => match e.stop_reason() {
                    Some(reason) => {
                        warn!(job_id = %job.id, prospect_id = %prospect.id, error = %e, "batch aborted by provider");
                        job = self.stop(job, BatchStatus::Paused, Some(reason)).await?;
                        return Ok(BatchOutcome::from_job(&job));
                    }
                    None => {
                        // Unrecoverable (storage). Best-effort ledger update, then propagate.
                        let _ = self
                            .store
                            .set_ledger_status(job.id, BatchStatus::Failed, None)
                            .await;
                        return Err(e);
                    }
                },
            }

            // Deliberate throttle between items; a pause request skips it.
            if !self.config.item_delay.is_zero() {
                tokio::select! {
                    _ = pause.cancelled() => {}
                    _ = tokio::time::sleep(self.config.item_delay) => {}
                }
            }
        }

        Ok(BatchOutcome::from_job(&job))
    }

    async fn stop(
        &self,
        job: BatchJob,
        status: BatchStatus,
        reason: Option<StopReason>,
    ) -> Result<BatchJob> {
        let updated = self.store.set_ledger_status(job.id, status, reason).await?;
        self.store
            .append_audit(NewAuditEntry::batch_status(
                job.id,
                job.status,
                status,
                updated.progress_message(),
            ))
            .await?;
        info!(job_id = %job.id, status = %status, "batch stopped: {}", updated.progress_message());
        Ok(updated)
    }

    /// Process one claimed prospect. The lease is released on every path:
    /// `finish_attempt` releases it together with the outcome, and the
    /// batch-fatal arm releases it before propagating.
    async fn attempt(&self, prospect: &Prospect, token: Uuid) -> Result<ItemOutcome> {
        let report = self
            .store
            .report(prospect.report_id)
            .await?
            .ok_or(EnrichmentError::ReportNotFound {
                id: prospect.report_id,
            })?;

        match self.run_stages(&report).await {
            Ok(findings) if !findings.emails.is_empty() => {
                self.persist_findings(prospect, token, findings).await
            }
            Ok(_) => {
                self.finish_failed(prospect, token, false, "no results after all stages")
                    .await
            }
            Err(e) if e.is_batch_fatal() => {
                // Abort the whole batch: the item is untouched, not charged
                // a retry, and immediately eligible after resume.
                self.store.release(prospect.id, token, prospect.status).await?;
                self.store
                    .append_audit(NewAuditEntry::prospect_status(
                        prospect.id,
                        ProspectStatus::Enriching,
                        prospect.status,
                        format!("released without attempt: {}", e),
                    ))
                    .await?;
                Err(e.into())
            }
            Err(e) => {
                warn!(prospect_id = %prospect.id, error = %e, "provider error during attempt");
                self.finish_failed(prospect, token, true, &format!("provider error: {}", e))
                    .await
            }
        }
    }

    /// Run the staged plan for one report. Stages run strictly in order;
    /// within a stage, queries run sequentially so a rate-limit signal is
    /// seen before the next call goes out.
    async fn run_stages(&self, report: &Report) -> std::result::Result<StageFindings, SearchError> {
        let mut findings = StageFindings::default();

        for stage in self.plan.stages() {
            if stage.requires_name && findings.name.is_none() {
                debug!(stage = stage.name, "skipped: no name found earlier");
                continue;
            }
            let satisfied = match stage.purpose {
                StagePurpose::FindName => findings.name.is_some(),
                StagePurpose::FindEmail => !findings.emails.is_empty(),
            };
            if satisfied {
                continue;
            }

            for template in &stage.templates {
                let prompt = stage.render(template, report, findings.name.as_ref());
                let text = self.searcher.search(&prompt).await?;

                match stage.purpose {
                    StagePurpose::FindName => {
                        if let Some(name) = parse_full_name(&text) {
                            debug!(stage = stage.name, name = %name.full(), "name found");
                            findings.name = Some(name);
                            break;
                        }
                    }
                    StagePurpose::FindEmail => {
                        let emails = extract_valid_emails(&text);
                        if !emails.is_empty() {
                            debug!(stage = stage.name, count = emails.len(), "emails found");
                            for email in emails {
                                if !findings.emails.iter().any(|f| f.email == email) {
                                    findings.emails.push(FoundEmail {
                                        email,
                                        stage: stage.name,
                                    });
                                }
                            }
                            break;
                        }
                    }
                }
            }
        }

        Ok(findings)
    }

    async fn persist_findings(
        &self,
        prospect: &Prospect,
        token: Uuid,
        findings: StageFindings,
    ) -> Result<ItemOutcome> {
        let name = findings.name;
        let mut inserted = 0usize;

        for (i, found) in findings
            .emails
            .iter()
            .take(self.config.max_contacts_per_prospect)
            .enumerate()
        {
            let is_primary = i == 0;
            self.store
                .insert_contact(NewContact {
                    prospect_id: prospect.id,
                    report_id: prospect.report_id,
                    first_name: if is_primary {
                        name.as_ref().map(|n| n.first.clone())
                    } else {
                        None
                    },
                    last_name: if is_primary {
                        name.as_ref().map(|n| n.last.clone())
                    } else {
                        None
                    },
                    email: Some(found.email.clone()),
                    phone: None,
                    source_note: Some(format!("found via {} stage", found.stage)),
                    is_primary,
                })
                .await?;
            inserted += 1;
        }

        match self
            .store
            .finish_attempt(
                prospect.id,
                token,
                AttemptDisposition {
                    status: ProspectStatus::Enriched,
                    count_retry: false,
                },
            )
            .await
        {
            Ok(_) => {
                self.store
                    .append_audit(NewAuditEntry::prospect_status(
                        prospect.id,
                        ProspectStatus::Enriching,
                        ProspectStatus::Enriched,
                        format!("enriched with {} contacts", inserted),
                    ))
                    .await?;
                info!(prospect_id = %prospect.id, contacts = inserted, "prospect enriched");
                Ok(ItemOutcome::Enriched { contacts: inserted })
            }
            Err(EnrichmentError::LeaseLost { .. }) => {
                warn!(prospect_id = %prospect.id, "lease lost before finish; item skipped");
                Ok(ItemOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// A completed attempt with nothing to show: charge a retry and either
    /// re-queue for review or retire the prospect at the ceiling.
    /// `provider_error` picks the terminal status flavor.
    async fn finish_failed(
        &self,
        prospect: &Prospect,
        token: Uuid,
        provider_error: bool,
        context: &str,
    ) -> Result<ItemOutcome> {
        let exhausted = prospect.retry_count + 1 >= self.config.retry_ceiling;
        let status = match (exhausted, provider_error) {
            (false, _) => ProspectStatus::Review,
            (true, false) => ProspectStatus::NotViable,
            (true, true) => ProspectStatus::EnrichmentFailed,
        };

        match self
            .store
            .finish_attempt(
                prospect.id,
                token,
                AttemptDisposition {
                    status,
                    count_retry: true,
                },
            )
            .await
        {
            Ok(updated) => {
                self.store
                    .append_audit(NewAuditEntry::prospect_status(
                        prospect.id,
                        ProspectStatus::Enriching,
                        status,
                        format!(
                            "{} (attempt {}/{})",
                            context, updated.retry_count, self.config.retry_ceiling
                        ),
                    ))
                    .await?;
                Ok(if exhausted {
                    ItemOutcome::Exhausted
                } else {
                    ItemOutcome::Retry
                })
            }
            Err(EnrichmentError::LeaseLost { .. }) => {
                warn!(prospect_id = %prospect.id, "lease lost before finish; item skipped");
                Ok(ItemOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }
}
