//! Automatic enrichment tick, driven by a cron schedule.
//!
//! Each tick starts one batch over the eligible backlog, unless a batch is
//! already active or there is nothing to do.

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use enrichment::{JobType, LedgerStore, ProspectStore};

use crate::server::app::AppState;

/// Start the cron scheduler with the auto-enrich job attached.
pub async fn start_scheduler(state: AppState, cron: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("failed to create scheduler: {e}"))?;

    let job = Job::new_async(cron, move |_id, _sched| {
        let state = state.clone();
        Box::pin(async move {
            auto_enrich_tick(state).await;
        })
    })
    .map_err(|e| anyhow!("invalid ENRICH_CRON expression: {e}"))?;

    sched
        .add(job)
        .await
        .map_err(|e| anyhow!("failed to add cron job: {e}"))?;
    sched
        .start()
        .await
        .map_err(|e| anyhow!("failed to start scheduler: {e}"))?;

    info!(cron, "auto-enrich scheduler started");
    Ok(sched)
}

/// One tick: start and run a batch over whatever is eligible right now.
pub async fn auto_enrich_tick(state: AppState) {
    let store = &state.store;

    match store.active_ledger(JobType::Enrich).await {
        Ok(Some(job)) => {
            info!(job_id = %job.id, "tick skipped: batch already active");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "tick failed to check active ledger");
            return;
        }
    }

    let eligible = match store
        .count_eligible(&JobType::Enrich.filter(), Utc::now())
        .await
    {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "tick failed to count eligible prospects");
            return;
        }
    };
    if eligible == 0 {
        return;
    }

    let job = match state.worker.start_batch(JobType::Enrich).await {
        Ok(job) => job,
        Err(e) => {
            // A batch started by hand between the check and here is fine.
            warn!(error = %e, "tick could not start a batch");
            return;
        }
    };

    let token = state.running.register(job.id);
    let result = state.worker.run_batch(job.id, token).await;
    state.running.finish(job.id);

    match result {
        Ok(outcome) => info!(
            job_id = %job.id,
            processed = outcome.processed,
            successful = outcome.successful,
            failed = outcome.failed,
            status = %outcome.status,
            "tick batch finished"
        ),
        Err(e) => error!(job_id = %job.id, error = %e, "tick batch failed"),
    }
}
