//! Detached cache writes.
//!
//! A successful network response is returned to the caller before its copy is
//! stored. The write runs on its own task; failures are logged and dropped.

use crate::cache::CacheStorage;
use crate::error::Result;
use crate::http::{RequestKey, Response};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Run a synchronous storage operation on the blocking pool.
pub(crate) async fn with_storage<T, F>(storage: &Arc<dyn CacheStorage>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn CacheStorage) -> Result<T> + Send + 'static,
{
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || op(storage.as_ref())).await?
}

#[derive(Default)]
struct Tracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the write task ends, even on panic.
struct InFlight(Arc<Tracker>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Spawns fire-and-forget cache writes and tracks how many are outstanding.
#[derive(Clone, Default)]
pub struct BackgroundWriter {
    tracker: Arc<Tracker>,
}

impl BackgroundWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response` under `key` without making the caller wait.
    pub fn spawn_put(
        &self,
        storage: Arc<dyn CacheStorage>,
        namespace: String,
        key: RequestKey,
        response: Response,
    ) {
        self.tracker.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(&self.tracker));

        tokio::spawn(async move {
            let _guard = guard;
            let label = key.to_string();
            let result = with_storage(&storage, move |s| {
                s.open(&namespace)?;
                s.put(&namespace, &key, &response)
            })
            .await;

            match result {
                Ok(()) => debug!("Cached {}", label),
                Err(e) => warn!("Dropping cache write for {}: {}", label, e),
            }
        });
    }

    /// Number of writes still running.
    pub fn pending(&self) -> usize {
        self.tracker.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every write spawned so far has finished.
    pub async fn settle(&self) {
        loop {
            let idle = self.tracker.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }
}
