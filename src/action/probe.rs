use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

type Pending<T> = Arc<Mutex<HashMap<String, oneshot::Sender<T>>>>;

/// Correlates an emitted probe with a later classified event.
///
/// A caller registers a short id, emits an action carrying it, and waits on
/// the returned [`ProbeGuard`]. Whoever observes the echo resolves the id.
/// The pending entry is removed when the guard is dropped, whether or not the
/// echo arrived.
#[derive(Debug)]
pub struct ProbeRegistry<T> {
    pending: Pending<T>,
}

impl<T> Clone for ProbeRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for ProbeRegistry<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Send + 'static> ProbeRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh correlation id.
    #[must_use]
    pub fn register(&self) -> ProbeGuard<T> {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);
        ProbeGuard {
            id,
            rx,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Resolves `id` with `value`. Returns false if nobody is waiting on it.
    pub fn resolve(&self, id: &str, value: T) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        sender.is_some_and(|tx| tx.send(value).is_ok())
    }

    /// Resolves the first pending id accepted by `matches`, returning that id.
    pub fn resolve_where(&self, matches: impl Fn(&str) -> bool, value: T) -> Option<String> {
        let found = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let id = pending.keys().find(|id| matches(id.as_str())).cloned()?;
            pending.remove(&id).map(|tx| (id, tx))
        };
        let (id, tx) = found?;
        tx.send(value).ok()?;
        Some(id)
    }

    /// Ids of probes still waiting.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of probes still waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A registered probe. Dropping it deregisters the id.
#[derive(Debug)]
pub struct ProbeGuard<T> {
    id: String,
    rx: oneshot::Receiver<T>,
    pending: Pending<T>,
}

impl<T> ProbeGuard<T> {
    /// The correlation id to embed in the probe action.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits up to `timeout` for the echo, falling back to `fallback`.
    pub async fn wait_or(mut self, timeout: Duration, fallback: T) -> T {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) | Err(_) => {
                debug!(probe = %self.id, "probe not echoed in time, using fallback");
                fallback
            }
        }
    }
}

impl<T> Drop for ProbeGuard<T> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
