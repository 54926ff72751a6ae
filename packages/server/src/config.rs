use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub search_api_key: String,
    pub search_api_url: String,
    pub search_model: Option<String>,
    /// Cron expression for the automatic enrichment tick; `ENRICH_CRON=off`
    /// disables it.
    pub enrich_cron: Option<String>,
    pub rate_limit_per_minute: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            search_api_key: env::var("SEARCH_API_KEY").context("SEARCH_API_KEY must be set")?,
            search_api_url: env::var("SEARCH_API_URL")
                .unwrap_or_else(|_| "https://api.sonarsearch.io".to_string()),
            search_model: env::var("SEARCH_MODEL").ok(),
            enrich_cron: match env::var("ENRICH_CRON") {
                Ok(v) if v.eq_ignore_ascii_case("off") => None,
                Ok(v) => Some(v),
                Err(_) => Some("0 */15 * * * *".to_string()),
            },
            rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("RATE_LIMIT_PER_MINUTE must be a valid number")?,
        })
    }
}
