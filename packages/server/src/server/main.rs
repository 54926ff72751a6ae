// Main entry point for the enrichment service

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrichment::{HttpSearcher, Searcher};
use server_core::{build_app, build_state, jobs::tick::start_scheduler, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,enrichment=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting prospect enrichment service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Build the provider client
    let mut searcher = HttpSearcher::new(&config.search_api_key, &config.search_api_url);
    if let Some(model) = &config.search_model {
        searcher = searcher.with_model(model.as_str());
    }
    let searcher: Arc<dyn Searcher> = Arc::new(searcher);

    // Wire up state and background work
    let state = build_state(pool, searcher, &config);
    let _sweeper = state.limiter.spawn_sweeper();

    let _scheduler = match &config.enrich_cron {
        Some(cron) => Some(
            start_scheduler(state.clone(), cron)
                .await
                .context("Failed to start the auto-enrich scheduler")?,
        ),
        None => {
            tracing::info!("Auto-enrich scheduler disabled (ENRICH_CRON=off)");
            None
        }
    };

    // Start server
    let app = build_app(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
