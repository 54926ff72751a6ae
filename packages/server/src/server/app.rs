//! Application state and router assembly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Extension, Request};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use enrichment::{EnrichmentWorker, PostgresStore, Searcher};

use crate::common::SlidingWindowLimiter;
use crate::config::Config;
use crate::jobs::RunningJobs;
use crate::server::routes;

/// Shared application state, injected as an axum Extension.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub store: Arc<PostgresStore>,
    pub worker: Arc<EnrichmentWorker<PostgresStore>>,
    pub running: Arc<RunningJobs>,
    pub limiter: Arc<SlidingWindowLimiter>,
}

/// Wire up the state graph from a pool and a provider client.
pub fn build_state(pool: PgPool, searcher: Arc<dyn Searcher>, config: &Config) -> AppState {
    let store = Arc::new(PostgresStore::new(pool.clone()));
    let worker = Arc::new(EnrichmentWorker::new(store.clone(), searcher));
    let limiter = Arc::new(SlidingWindowLimiter::new(
        Duration::from_secs(60),
        config.rate_limit_per_minute,
    ));

    AppState {
        db_pool: pool,
        store,
        worker,
        running: Arc::new(RunningJobs::new()),
        limiter,
    }
}

/// Build the router.
pub fn build_app(state: AppState) -> Router {
    // Trigger routes sit behind the request limiter; everything else is
    // read-mostly and exempt.
    let triggers = Router::new()
        .route("/api/jobs/enrich", post(routes::jobs::run_enrich_handler))
        .route(
            "/api/jobs/re-enrich",
            post(routes::jobs::run_re_enrich_handler),
        )
        .route(
            "/api/jobs/:id/restart",
            post(routes::jobs::restart_job_handler),
        )
        .layer(middleware::from_fn(rate_limit_middleware));

    Router::new()
        .route("/health", get(routes::health::health_handler))
        .route("/api/jobs", get(routes::jobs::list_jobs_handler))
        .route("/api/jobs/:id", get(routes::jobs::job_status_handler))
        .route("/api/jobs/:id/pause", post(routes::jobs::pause_job_handler))
        .route(
            "/api/jobs/:id/force-fail",
            post(routes::jobs::force_fail_handler),
        )
        .route("/api/jobs/:id/audit", get(routes::jobs::job_audit_handler))
        .route("/api/reports", post(routes::reports::create_report_handler))
        .route(
            "/api/reports/:id/prospects",
            get(routes::reports::report_prospects_handler),
        )
        .route(
            "/api/prospects/:id/contacts",
            get(routes::reports::prospect_contacts_handler),
        )
        .merge(triggers)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

/// Client identity for rate limiting: forwarded-for when present (we sit
/// behind a proxy in production), socket address otherwise.
fn client_key(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

async fn rate_limit_middleware(
    Extension(state): Extension<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_key(req.headers(), addr);
    if !state.limiter.check(&key) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(routes::jobs::ErrorBody::new(
                429,
                "too many requests, slow down",
            )),
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_key_prefers_forwarded_for() {
        let addr: SocketAddr = "10.0.0.1:9999".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, addr), "10.0.0.1");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_key(&headers, addr), "203.0.113.7");
    }
}
