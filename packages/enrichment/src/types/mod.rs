//! Domain types for the enrichment pipeline.

pub mod batch;
pub mod config;
pub mod contact;
pub mod prospect;
pub mod report;

pub use batch::{BatchJob, BatchOutcome, BatchStatus, JobType, StopReason};
pub use config::WorkerConfig;
pub use contact::{Contact, NewContact};
pub use prospect::{Prospect, ProspectStatus};
pub use report::Report;
