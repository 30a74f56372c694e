use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cordlink_common::RelayError;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub type Outcome = Result<Value, RelayError>;

/// A command awaiting its response.
#[derive(Debug)]
pub struct PendingRequest {
    pub method: String,
    pub issued_at: Instant,
    pub deadline: Instant,
    completion: oneshot::Sender<Outcome>,
}

/// Outstanding commands by correlation id. Whoever removes an entry owns
/// its completion, so each id completes at most once.
#[derive(Debug, Default)]
pub struct PendingMap {
    inner: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingMap {
    pub fn insert(&self, id: String, method: &str, deadline: Instant) -> oneshot::Receiver<Outcome> {
        let (completion, rx) = oneshot::channel();
        self.lock().insert(
            id,
            PendingRequest {
                method: method.to_string(),
                issued_at: Instant::now(),
                deadline,
                completion,
            },
        );
        rx
    }

    /// Resolve `id`. Returns false if nothing was waiting on it.
    pub fn complete(&self, id: &str, outcome: Outcome) -> bool {
        let Some(pending) = self.lock().remove(id) else {
            return false;
        };
        tracing::debug!(
            id,
            method = %pending.method,
            elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
            "Response received"
        );
        // The caller may have given up already.
        let _ = pending.completion.send(outcome);
        true
    }

    pub fn remove(&self, id: &str) -> Option<PendingRequest> {
        self.lock().remove(id)
    }

    /// Drop every entry without completing it.
    pub fn clear(&self) -> usize {
        let mut map = self.lock();
        let n = map.len();
        map.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
