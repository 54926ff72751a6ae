//! Batch job trigger surface: start/resume, pause, status, operator repair.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use enrichment::{
    AuditLog, BatchJob, BatchStatus, EnrichmentError, JobType, LedgerStore, NewAuditEntry,
    ProspectStore, StopReason,
};

use crate::server::app::AppState;

/// Error envelope: `{error, code}` with an HTTP-style numeric code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

impl ErrorBody {
    pub fn new(code: u16, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

fn envelope(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(status.as_u16(), msg))).into_response()
}

fn internal(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "request failed");
    envelope(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Present to resume an existing ledger; absent to start a new batch.
    pub job_id: Option<Uuid>,
}

/// Ledger snapshot plus derived fields for the progress UI.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub job: BatchJob,
    pub frozen: bool,
    pub message: String,
}

pub async fn run_enrich_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<RunRequest>>,
) -> Response {
    run_batch_request(state, JobType::Enrich, body.and_then(|Json(b)| b.job_id)).await
}

pub async fn run_re_enrich_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<RunRequest>>,
) -> Response {
    run_batch_request(state, JobType::ReEnrich, body.and_then(|Json(b)| b.job_id)).await
}

async fn run_batch_request(state: AppState, job_type: JobType, job_id: Option<Uuid>) -> Response {
    let job = match job_id {
        // Resume an existing ledger.
        Some(id) => match state.store.ledger(id).await {
            Ok(Some(job)) => {
                if !job.can_transition(BatchStatus::Running) {
                    return envelope(
                        StatusCode::CONFLICT,
                        format!("job {} cannot resume from status {}", id, job.status),
                    );
                }
                job
            }
            Ok(None) => return envelope(StatusCode::NOT_FOUND, format!("job not found: {id}")),
            Err(e) => return internal(e),
        },
        // Start a fresh batch.
        None => match state.worker.start_batch(job_type).await {
            Ok(job) => job,
            Err(e @ EnrichmentError::BatchAlreadyRunning { .. }) => {
                return envelope(StatusCode::CONFLICT, e.to_string());
            }
            Err(e) => return internal(e),
        },
    };

    execute_batch(state, job.id).await
}

/// Run the batch inline and translate the outcome: a provider abort becomes
/// the matching error envelope, everything else the summary JSON.
async fn execute_batch(state: AppState, job_id: Uuid) -> Response {
    let token = state.running.register(job_id);
    let result = state.worker.run_batch(job_id, token).await;
    state.running.finish(job_id);

    match result {
        Ok(outcome) => match outcome.stopped_reason {
            Some(StopReason::RateLimit) => envelope(
                StatusCode::TOO_MANY_REQUESTS,
                format!(
                    "provider rate limit hit; batch paused after {} processed - retry later",
                    outcome.processed
                ),
            ),
            Some(StopReason::CreditsExhausted) => envelope(
                StatusCode::PAYMENT_REQUIRED,
                format!(
                    "search credits exhausted; batch paused at {} processed - add funds to continue",
                    outcome.processed
                ),
            ),
            _ => (StatusCode::OK, Json(outcome)).into_response(),
        },
        Err(e) => internal(e),
    }
}

pub async fn pause_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    let job = match state.store.ledger(id).await {
        Ok(Some(job)) => job,
        Ok(None) => return envelope(StatusCode::NOT_FOUND, format!("job not found: {id}")),
        Err(e) => return internal(e),
    };

    if state.running.pause(id) {
        // The loop finishes its current item, then parks the ledger.
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "pausing" })),
        )
            .into_response()
    } else if job.status == BatchStatus::Running {
        envelope(
            StatusCode::CONFLICT,
            "job is not running in this process; if it is frozen, use force-fail or restart",
        )
    } else {
        envelope(
            StatusCode::CONFLICT,
            format!("job is not running (status {})", job.status),
        )
    }
}

pub async fn job_status_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.ledger(id).await {
        Ok(Some(job)) => {
            let frozen = job.is_frozen(Utc::now());
            let message = job.progress_message();
            Json(JobStatusResponse {
                job,
                frozen,
                message,
            })
            .into_response()
        }
        Ok(None) => envelope(StatusCode::NOT_FOUND, format!("job not found: {id}")),
        Err(e) => internal(e),
    }
}

pub async fn list_jobs_handler(Extension(state): Extension<AppState>) -> Response {
    match state.store.recent_ledgers(20).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => internal(e),
    }
}

pub async fn job_audit_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.audit_for(id, 50).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => internal(e),
    }
}

pub async fn force_fail_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match force_fail(state, id).await {
        Ok(response) => response,
        Err(e) => internal(e),
    }
}

/// Operator repair for a frozen batch: stop any in-process run, return
/// in-flight prospects to review, mark the ledger failed.
async fn force_fail(state: AppState, id: Uuid) -> Result<Response, EnrichmentError> {
    let Some(job) = state.store.ledger(id).await? else {
        return Ok(envelope(
            StatusCode::NOT_FOUND,
            format!("job not found: {id}"),
        ));
    };
    if job.status.is_terminal() {
        return Ok(envelope(
            StatusCode::CONFLICT,
            format!("job already finished (status {})", job.status),
        ));
    }

    state.running.pause(id);
    let cleared = state.store.release_all_enriching().await?;
    let updated = state
        .store
        .set_ledger_status(id, BatchStatus::Failed, None)
        .await?;
    state
        .store
        .append_audit(NewAuditEntry::batch_status(
            id,
            job.status,
            BatchStatus::Failed,
            format!(
                "operator force-fail; {} in-flight prospects returned to review",
                cleared
            ),
        ))
        .await?;

    Ok(Json(updated).into_response())
}

pub async fn restart_job_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match restart(state, id).await {
        Ok(response) => response,
        Err(e) => internal(e),
    }
}

/// Operator repair: reset the ledger to queued with a fresh total, clear
/// leases, and run it again inline.
async fn restart(state: AppState, id: Uuid) -> Result<Response, EnrichmentError> {
    let Some(job) = state.store.ledger(id).await? else {
        return Ok(envelope(
            StatusCode::NOT_FOUND,
            format!("job not found: {id}"),
        ));
    };

    state.running.pause(id);
    let cleared = state.store.release_all_enriching().await?;

    let job_type = JobType::parse(&job.job_type)?;
    let total = state
        .store
        .count_eligible(&job_type.filter(), Utc::now())
        .await?;
    let reset = state.store.reset_ledger(id, total as i32).await?;
    state
        .store
        .append_audit(NewAuditEntry::batch_status(
            id,
            job.status,
            reset.status,
            format!(
                "operator restart; {} in-flight prospects returned to review",
                cleared
            ),
        ))
        .await?;

    Ok(execute_batch(state, id).await)
}
