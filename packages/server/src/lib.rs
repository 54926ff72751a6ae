//! Prospect enrichment service.
//!
//! Hosts the enrichment pipeline behind an HTTP trigger surface: manual
//! start/resume/pause, operator repair for frozen batches, a report import
//! endpoint, and a cron tick that drains the backlog automatically.

pub mod common;
pub mod config;
pub mod jobs;
pub mod server;

pub use config::Config;
pub use server::{build_app, build_state, AppState};
