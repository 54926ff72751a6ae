//! Registry of batches currently running in this process.
//!
//! The pause endpoint flips the cooperative token here; the batch loop sees
//! it between items. A job with no registered token is either finished or
//! running in another process, in which case pause cannot reach it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
pub struct RunningJobs {
    inner: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl RunningJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run and get its pause token. A token left over from a
    /// previous invocation of the same job is replaced.
    pub fn register(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().unwrap().insert(job_id, token.clone());
        token
    }

    /// Request a cooperative pause. Returns false when the job is not
    /// running in this process.
    pub fn pause(&self, job_id: Uuid) -> bool {
        match self.inner.lock().unwrap().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token once a run returns.
    pub fn finish(&self, job_id: Uuid) {
        self.inner.lock().unwrap().remove(&job_id);
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.inner.lock().unwrap().contains_key(&job_id)
    }
}
