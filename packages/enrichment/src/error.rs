//! Typed errors for the enrichment library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;
use uuid::Uuid;

use crate::types::batch::{BatchStatus, StopReason};

/// Errors from the external classification/search provider.
///
/// The two quota variants are batch-fatal: the worker must stop the whole
/// run, not just the current item. Everything else is a per-item failure.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Provider returned HTTP 429.
    #[error("search provider rate limit hit")]
    RateLimited,

    /// Provider returned HTTP 402.
    #[error("search credits exhausted")]
    CreditsExhausted,

    /// Any other provider failure (network, 5xx, malformed body).
    #[error("search provider error: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SearchError {
    /// True for signals that must abort the whole batch.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::RateLimited | Self::CreditsExhausted)
    }

    /// The ledger stop reason carried by a batch-fatal signal.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Self::RateLimited => Some(StopReason::RateLimit),
            Self::CreditsExhausted => Some(StopReason::CreditsExhausted),
            Self::Provider(_) => None,
        }
    }
}

/// Errors that can occur during enrichment operations.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// External search provider failed
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Prospect not found in store
    #[error("prospect not found: {id}")]
    ProspectNotFound { id: Uuid },

    /// Parent report not found in store
    #[error("report not found: {id}")]
    ReportNotFound { id: Uuid },

    /// Batch job ledger not found in store
    #[error("batch job not found: {id}")]
    LedgerNotFound { id: Uuid },

    /// The worker's lease on a prospect was taken over mid-attempt
    #[error("lease lost for prospect {id}")]
    LeaseLost { id: Uuid },

    /// Only one batch may run per job type
    #[error("a {job_type} batch is already running: {id}")]
    BatchAlreadyRunning { job_type: String, id: Uuid },

    /// Unknown job type string on a stored ledger
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    /// Disallowed ledger state machine transition
    #[error("invalid batch transition: {from} -> {to}")]
    InvalidTransition { from: BatchStatus, to: BatchStatus },
}

impl EnrichmentError {
    /// True for provider signals that must abort the whole batch.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Search(e) if e.is_batch_fatal())
    }

    /// The ledger stop reason for a batch-fatal error.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Self::Search(e) => e.stop_reason(),
            _ => None,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for EnrichmentError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

/// Result type alias for enrichment operations.
pub type Result<T> = std::result::Result<T, EnrichmentError>;

/// Result type alias for search provider operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;
