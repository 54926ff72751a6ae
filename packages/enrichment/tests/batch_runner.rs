//! End-to-end batch runner tests against the in-memory store and the
//! scripted mock provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use enrichment::error::SearchResult;
use enrichment::testing::{MockFailure, MockSearcher};
use enrichment::{
    AuditLog, BatchJob, BatchStatus, ContactStore, EnrichmentWorker, JobType, LedgerStore,
    MemoryStore, Prospect, ProspectStatus, ProspectStore, Searcher, StopReason, WorkerConfig,
};

fn assert_counter_invariants(job: &BatchJob) {
    assert!(job.success_count + job.failure_count <= job.processed_count);
    assert!(job.processed_count <= job.total_count);
}

/// Seed `n` prospects with strictly increasing creation times so the
/// selection order is deterministic.
fn seed_prospects(store: &MemoryStore, domains: &[&str]) -> Vec<Uuid> {
    let base = Utc::now() - Duration::hours(1);
    let mut ids = Vec::new();
    for (i, domain) in domains.iter().enumerate() {
        let report = enrichment::Report::new(*domain, None);
        let mut prospect = Prospect::new(report.id);
        prospect.created_at = base + Duration::seconds(i as i64);
        ids.push(prospect.id);
        store.seed_report(report);
        store.seed_prospect(prospect);
    }
    ids
}

fn worker(
    store: &Arc<MemoryStore>,
    searcher: Arc<dyn Searcher>,
) -> EnrichmentWorker<MemoryStore> {
    EnrichmentWorker::new(store.clone(), searcher).with_config(WorkerConfig::immediate())
}

#[tokio::test]
async fn scenario_name_and_email_found() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed_prospects(&store, &["acme.com"]);

    let mock = Arc::new(
        MockSearcher::new()
            .with_response("email address of Jane Doe", "Her address is jane@acme.com.")
            .with_response("owner", "Jane Doe"),
    );
    let worker = worker(&store, mock.clone());

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    assert_eq!(job.total_count, 1);

    let outcome = worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.successful, 1);
    assert_eq!(outcome.failed, 0);

    let prospect = store.prospect(ids[0]).await.unwrap().unwrap();
    assert_eq!(prospect.status, ProspectStatus::Enriched);
    assert!(prospect.lock_token.is_none());

    let contacts = store.contacts_for_prospect(ids[0]).await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert!(contacts[0].is_primary);
    assert_eq!(contacts[0].email.as_deref(), Some("jane@acme.com"));
    assert_eq!(contacts[0].first_name.as_deref(), Some("Jane"));
    assert_eq!(contacts[0].last_name.as_deref(), Some("Doe"));

    // Name stage answered on the first query, email stage on the second;
    // the site-wide fallback stage never ran.
    assert_eq!(mock.call_count(), 2);
    let calls = mock.calls();
    assert!(calls[0].contains("owner of the business"));
    assert!(calls[1].contains("email address of Jane Doe"));

    assert_counter_invariants(&store.ledger(job.id).await.unwrap().unwrap());
}

#[tokio::test]
async fn scenario_retries_exhausted_goes_not_viable() {
    let store = Arc::new(MemoryStore::new());
    let report = enrichment::Report::new("acme.com", None);
    let mut prospect = Prospect::new(report.id);
    prospect.status = ProspectStatus::Review;
    prospect.retry_count = 2;
    prospect.last_attempt_at = Some(Utc::now() - Duration::hours(3));
    let prospect_id = prospect.id;
    store.seed_report(report);
    store.seed_prospect(prospect);

    // Every query comes back empty-handed.
    let mock = Arc::new(MockSearcher::new());
    let worker = worker(&store, mock.clone());

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    let outcome = worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 1);

    let prospect = store.prospect(prospect_id).await.unwrap().unwrap();
    assert_eq!(prospect.status, ProspectStatus::NotViable);
    assert_eq!(prospect.retry_count, 3);

    // Without a name, the named-email stage must have been skipped.
    assert!(!mock.calls().iter().any(|c| c.contains("email address of")));

    assert_counter_invariants(&store.ledger(job.id).await.unwrap().unwrap());
}

#[tokio::test]
async fn scenario_rate_limit_aborts_batch() {
    let store = Arc::new(MemoryStore::new());
    let domains: Vec<String> = (1..=20).map(|i| format!("acme{:02}.com", i)).collect();
    let domain_refs: Vec<&str> = domains.iter().map(|s| s.as_str()).collect();
    let ids = seed_prospects(&store, &domain_refs);

    let mut mock = MockSearcher::new();
    for domain in domains.iter().take(4) {
        mock = mock.with_response(domain, &format!("Reach them at owner@{domain}."));
    }
    mock = mock.with_failure("acme05.com", MockFailure::RateLimited);
    let worker = worker(&store, Arc::new(mock));

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    assert_eq!(job.total_count, 20);

    let outcome = worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Paused);
    assert_eq!(outcome.stopped_reason, Some(StopReason::RateLimit));
    assert_eq!(outcome.processed, 4);
    assert_eq!(outcome.successful, 4);

    // The aborting item is untouched: no retry charged, lease released,
    // immediately eligible again.
    let fifth = store.prospect(ids[4]).await.unwrap().unwrap();
    assert_eq!(fifth.status, ProspectStatus::New);
    assert_eq!(fifth.retry_count, 0);
    assert!(fifth.lock_token.is_none());

    // Items 6-20 were never attempted.
    for id in &ids[5..] {
        let p = store.prospect(*id).await.unwrap().unwrap();
        assert_eq!(p.status, ProspectStatus::New);
        assert!(p.last_attempt_at.is_none());
    }

    assert_counter_invariants(&store.ledger(job.id).await.unwrap().unwrap());
}

#[tokio::test]
async fn scenario_credits_exhausted_sets_reason() {
    let store = Arc::new(MemoryStore::new());
    seed_prospects(&store, &["acme.com"]);

    let mock = MockSearcher::new().with_failure("acme.com", MockFailure::CreditsExhausted);
    let worker = worker(&store, Arc::new(mock));

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    let outcome = worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Paused);
    assert_eq!(outcome.stopped_reason, Some(StopReason::CreditsExhausted));
    assert_eq!(outcome.processed, 0);
}

/// Cancels the pause token the first time a prompt mentions the needle,
/// simulating a user pressing pause while that item is mid-flight.
struct CancelOnPrompt {
    inner: MockSearcher,
    needle: String,
    token: CancellationToken,
}

#[async_trait]
impl Searcher for CancelOnPrompt {
    async fn search(&self, prompt: &str) -> SearchResult<String> {
        if prompt.contains(&self.needle) {
            self.token.cancel();
        }
        self.inner.search(prompt).await
    }
}

#[tokio::test]
async fn scenario_pause_lands_between_items() {
    let store = Arc::new(MemoryStore::new());
    let domains: Vec<String> = (1..=20).map(|i| format!("acme{:02}.com", i)).collect();
    let domain_refs: Vec<&str> = domains.iter().map(|s| s.as_str()).collect();
    let ids = seed_prospects(&store, &domain_refs);

    let mut mock = MockSearcher::new();
    for domain in &domains {
        mock = mock.with_response(domain, &format!("Reach them at owner@{domain}."));
    }

    let token = CancellationToken::new();
    let searcher = Arc::new(CancelOnPrompt {
        inner: mock,
        needle: "acme07.com".to_string(),
        token: token.clone(),
    });
    let worker = worker(&store, searcher);

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    let outcome = worker.run_batch(job.id, token).await.unwrap();

    // Item 7 finishes; the loop stops before item 8.
    assert_eq!(outcome.status, BatchStatus::Paused);
    assert_eq!(outcome.stopped_reason, Some(StopReason::UserPaused));
    assert_eq!(outcome.processed, 7);
    assert_eq!(outcome.successful, 7);

    let seventh = store.prospect(ids[6]).await.unwrap().unwrap();
    assert_eq!(seventh.status, ProspectStatus::Enriched);
    let eighth = store.prospect(ids[7]).await.unwrap().unwrap();
    assert_eq!(eighth.status, ProspectStatus::New);

    assert_counter_invariants(&store.ledger(job.id).await.unwrap().unwrap());
}

#[tokio::test]
async fn paused_batch_resumes_to_completion() {
    let store = Arc::new(MemoryStore::new());
    let domains: Vec<String> = (1..=6).map(|i| format!("acme{:02}.com", i)).collect();
    let domain_refs: Vec<&str> = domains.iter().map(|s| s.as_str()).collect();
    seed_prospects(&store, &domain_refs);

    // First invocation hits the rate limit on item 3.
    let mut mock = MockSearcher::new();
    for domain in domains.iter().take(2) {
        mock = mock.with_response(domain, &format!("Reach them at owner@{domain}."));
    }
    mock = mock.with_failure("acme03.com", MockFailure::RateLimited);
    let first = worker(&store, Arc::new(mock));

    let job = first.start_batch(JobType::Enrich).await.unwrap();
    let outcome = first
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Paused);
    assert_eq!(outcome.processed, 2);

    // Second invocation resumes the same ledger and drains the rest.
    let retry_mock = MockSearcher::new().with_response("acme", "Reach them at owner@acme.com.");
    let second = worker(&store, Arc::new(retry_mock));
    let outcome = second
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.processed, 6);
    assert_eq!(outcome.successful, 6);

    assert_counter_invariants(&store.ledger(job.id).await.unwrap().unwrap());
}

#[tokio::test]
async fn retry_count_is_monotonic_across_runs() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed_prospects(&store, &["acme.com"]);

    let worker = worker(&store, Arc::new(MockSearcher::new()));

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    let after_first = store.prospect(ids[0]).await.unwrap().unwrap();
    assert_eq!(after_first.status, ProspectStatus::Review);
    assert_eq!(after_first.retry_count, 1);

    // Inside the 30-minute backoff window: nothing is eligible.
    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    assert_eq!(job.total_count, 0);
    worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        store.prospect(ids[0]).await.unwrap().unwrap().retry_count,
        1
    );

    // Past the window: one more attempt, one more retry.
    let mut stale = store.prospect(ids[0]).await.unwrap().unwrap();
    stale.last_attempt_at = Some(Utc::now() - Duration::minutes(31));
    store.seed_prospect(stale);

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        store.prospect(ids[0]).await.unwrap().unwrap().retry_count,
        2
    );
}

#[tokio::test]
async fn contact_inserts_are_bounded() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed_prospects(&store, &["acme.com"]);

    let many: Vec<String> = (0..30).map(|i| format!("user{:02}@acme.com", i)).collect();
    let mock = MockSearcher::new().with_response("acme.com", &many.join(" "));
    let worker = worker(&store, Arc::new(mock));

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();

    let contacts = store.contacts_for_prospect(ids[0]).await.unwrap();
    assert_eq!(contacts.len(), 25);
    assert_eq!(contacts.iter().filter(|c| c.is_primary).count(), 1);
}

#[tokio::test]
async fn transient_provider_error_charges_a_retry_without_stopping_the_batch() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed_prospects(&store, &["broken.com", "fine.com"]);

    let mock = MockSearcher::new()
        .with_failure("broken.com", MockFailure::Provider)
        .with_response("fine.com", "Reach them at owner@fine.com.");
    let worker = worker(&store, Arc::new(mock));

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    let outcome = worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.successful, 1);
    assert_eq!(outcome.failed, 1);

    let broken = store.prospect(ids[0]).await.unwrap().unwrap();
    assert_eq!(broken.status, ProspectStatus::Review);
    assert_eq!(broken.retry_count, 1);
}

#[tokio::test]
async fn only_one_batch_per_job_type() {
    let store = Arc::new(MemoryStore::new());
    seed_prospects(&store, &["acme.com"]);

    let worker = worker(&store, Arc::new(MockSearcher::new()));
    let first = worker.start_batch(JobType::Enrich).await.unwrap();

    let err = worker.start_batch(JobType::Enrich).await.unwrap_err();
    assert!(matches!(
        err,
        enrichment::EnrichmentError::BatchAlreadyRunning { .. }
    ));

    // A different job type is unaffected.
    worker.start_batch(JobType::ReEnrich).await.unwrap();

    // Finishing the first frees the slot.
    worker
        .run_batch(first.id, CancellationToken::new())
        .await
        .unwrap();
    worker.start_batch(JobType::Enrich).await.unwrap();
}

#[tokio::test]
async fn transitions_are_audited() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed_prospects(&store, &["acme.com"]);

    let mock = MockSearcher::new().with_response("acme.com", "owner@acme.com");
    let worker = worker(&store, Arc::new(mock));

    let job = worker.start_batch(JobType::Enrich).await.unwrap();
    worker
        .run_batch(job.id, CancellationToken::new())
        .await
        .unwrap();

    let prospect_trail = store.audit_for(ids[0], 10).await.unwrap();
    assert_eq!(prospect_trail.len(), 2); // claimed + enriched
    assert!(prospect_trail
        .iter()
        .any(|e| e.new_value == "enriched" && e.old_value.as_deref() == Some("enriching")));

    let job_trail = store.audit_for(job.id, 10).await.unwrap();
    assert_eq!(job_trail.len(), 2); // started + completed
    assert!(job_trail
        .iter()
        .any(|e| e.new_value == "completed" && e.context.contains("succeeded")));
}
