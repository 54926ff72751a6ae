//! Core trait abstractions (search provider, storage).

pub mod searcher;
pub mod store;

pub use searcher::{HttpSearcher, Searcher};
pub use store::{
    AttemptDisposition, AuditEntry, AuditLog, ContactStore, EnrichmentStore, LedgerStore,
    NewAuditEntry, ProspectStore, ReportStore,
};
