//! Prospect Enrichment Pipeline
//!
//! A resumable, rate-limited batch runner over a queue of prospect rows.
//! For each prospect it asks a web-search-enabled provider a staged
//! sequence of questions (find a decision-maker's name, then their email,
//! then any published address), validates the answers into contact records,
//! and keeps durable per-item and per-batch progress.
//!
//! # Design
//!
//! - One logical worker, strictly sequential items, a fixed throttle
//!   between them.
//! - Cooperative pause checked only between items.
//! - A provider 429/402 aborts the remaining batch and parks the ledger in
//!   `paused` with a machine-readable stop reason; everything else is a
//!   per-item failure with a fixed backoff schedule.
//! - Claims are leases: a crashed worker's claim self-expires.
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Searcher, storage)
//! - [`types`] - Domain types (prospect, ledger, contact, report)
//! - [`selector`] - Eligibility predicate and the backoff table
//! - [`stages`] - Ordered query plans with acceptance predicates
//! - [`parse`] - Strict name/email extractors
//! - [`worker`] - The per-item worker and the batch loop
//! - [`stores`] - Storage implementations (memory, Postgres)
//! - [`testing`] - Scripted mock provider for tests

pub mod error;
pub mod parse;
pub mod selector;
pub mod stages;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;
pub mod worker;

// Re-export core types at crate root
pub use error::{EnrichmentError, Result, SearchError};
pub use stages::{Stage, StagePlan, StagePurpose};
pub use traits::{
    searcher::{HttpSearcher, Searcher},
    store::{
        AttemptDisposition, AuditEntry, AuditLog, ContactStore, EnrichmentStore, LedgerStore,
        NewAuditEntry, ProspectStore, ReportStore,
    },
};
pub use types::{
    batch::{BatchJob, BatchOutcome, BatchStatus, JobType, StopReason},
    config::WorkerConfig,
    contact::{Contact, NewContact},
    prospect::{Prospect, ProspectStatus},
    report::Report,
};
pub use worker::{EnrichmentWorker, ItemOutcome};

pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;
