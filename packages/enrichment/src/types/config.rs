//! Configuration for the enrichment worker.

use std::time::Duration;

/// Tunables for the batch worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Attempts after which a prospect becomes terminal.
    pub retry_ceiling: i32,
    /// Mandatory delay between items, a deliberate throttle for the
    /// external provider.
    pub item_delay: Duration,
    /// How long a claim lease lasts before it self-expires.
    pub lease_duration: chrono::Duration,
    /// Upper bound on contact inserts per prospect per enrichment.
    pub max_contacts_per_prospect: usize,
    /// Cap on `total_count` when starting a batch; `None` takes every
    /// eligible prospect.
    pub max_batch_size: Option<i64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            item_delay: Duration::from_secs(2),
            lease_duration: chrono::Duration::minutes(10),
            max_contacts_per_prospect: 25,
            max_batch_size: None,
        }
    }
}

impl WorkerConfig {
    /// Config suited to tests: no inter-item delay.
    pub fn immediate() -> Self {
        Self {
            item_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}
