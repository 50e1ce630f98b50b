//! The network-first request interceptor.

use super::background::{with_storage, BackgroundWriter};
use super::clients::ClientRegistry;
use super::lifecycle::WorkerState;
use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::error::{NetfirstError, Result};
use crate::http::{Request, Response};
use crate::network::Fetcher;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// What the host should do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host applies its default handling.
    Passthrough,
    /// Serve this response.
    Respond(Response),
    /// Network failed and nothing was cached; the load fails.
    Unfulfilled,
}

/// Result of a completed activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Stale namespaces that were deleted.
    pub deleted: Vec<String>,
    /// Clients whose controller changed to this worker.
    pub claimed: usize,
}

/// Snapshot of a worker for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub cache_name: String,
    pub state: WorkerState,
    pub skip_waiting: bool,
    pub clients: usize,
    pub controlled_clients: usize,
    pub pending_writes: usize,
}

struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

/// Network-first interceptor owning one cache namespace.
///
/// The host delivers `install`, `activate` and per-request `handle_fetch`
/// calls. Requests are independent and may be handled concurrently.
pub struct ServiceWorker {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<ClientRegistry>,
    lifecycle: RwLock<Lifecycle>,
    writer: BackgroundWriter,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            clients,
            lifecycle: RwLock::new(Lifecycle {
                state: WorkerState::Parsed,
                skip_waiting: false,
            }),
            writer: BackgroundWriter::new(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle
            .read()
            .map(|l| l.state)
            .unwrap_or(WorkerState::Redundant)
    }

    fn transition(&self, to: WorkerState) -> Result<()> {
        let mut lifecycle = self
            .lifecycle
            .write()
            .map_err(|e| NetfirstError::Other(format!("Worker state lock poisoned: {}", e)))?;
        lifecycle.state = lifecycle.state.transition(to)?;
        debug!("Worker '{}' is now {}", self.config.cache_name, to);
        Ok(())
    }

    /// Handle the install signal.
    ///
    /// Nothing is pre-cached; the worker asks to activate without waiting for
    /// an older instance to go idle.
    pub async fn install(&self) -> Result<()> {
        self.transition(WorkerState::Installing)?;
        self.skip_waiting()?;
        self.transition(WorkerState::Installed)?;
        info!("Worker '{}' installed", self.config.cache_name);
        Ok(())
    }

    fn skip_waiting(&self) -> Result<()> {
        let mut lifecycle = self
            .lifecycle
            .write()
            .map_err(|e| NetfirstError::Other(format!("Worker state lock poisoned: {}", e)))?;
        lifecycle.skip_waiting = true;
        Ok(())
    }

    /// Handle the activate signal.
    ///
    /// Deletes every namespace other than the configured one (concurrently,
    /// all awaited) and then claims all open clients. If a deletion fails the
    /// error is returned, no clients are claimed and the worker stays
    /// `Activating` so activation can be retried.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.transition(WorkerState::Activating)?;

        let names = with_storage(&self.storage, |s| s.keys()).await?;
        let deletions = names
            .into_iter()
            .filter(|name| name != &self.config.cache_name)
            .map(|name| {
                let storage = Arc::clone(&self.storage);
                async move {
                    info!("Clearing old cache '{}'", name);
                    let target = name.clone();
                    with_storage(&storage, move |s| s.delete(&target)).await?;
                    Ok::<_, NetfirstError>(name)
                }
            });
        let deleted = try_join_all(deletions).await?;

        let claimed = self.clients.claim(&self.config.cache_name)?;
        self.transition(WorkerState::Activated)?;

        info!(
            "Worker '{}' activated: {} old cache(s) removed, {} client(s) claimed",
            self.config.cache_name,
            deleted.len(),
            claimed
        );
        Ok(ActivationReport { deleted, claimed })
    }

    /// Mark this worker as replaced. It stops intercepting immediately.
    pub fn retire(&self) -> Result<()> {
        self.transition(WorkerState::Redundant)
    }

    /// Handle one intercepted request.
    ///
    /// The network is always tried first. A cacheable response to a `GET` is
    /// stored in the background and returned without waiting for the write.
    /// A network failure falls back to the cache for `GET` requests; other
    /// methods are left unfulfilled.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !request.is_http() {
            debug!("Not intercepting {} (scheme '{}')", request.url, request.url.scheme());
            return FetchOutcome::Passthrough;
        }
        if !self.state().can_intercept_fetch() {
            debug!("Worker not active, passing {} through", request.url);
            return FetchOutcome::Passthrough;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() && request.is_cacheable_method() {
                    self.writer.spawn_put(
                        Arc::clone(&self.storage),
                        self.config.cache_name.clone(),
                        request.key(),
                        response.clone(),
                    );
                } else {
                    debug!(
                        "Not caching {} {} ({} {})",
                        request.method, request.url, response.status, response.response_type
                    );
                }
                FetchOutcome::Respond(response)
            }
            Err(e) if !request.is_cacheable_method() => {
                info!(
                    "Network failed for {} {}, not looking in cache: {}",
                    request.method, request.url, e
                );
                FetchOutcome::Unfulfilled
            }
            Err(e) => {
                info!(
                    "Network failed, looking in cache for: {} ({})",
                    request.url, e
                );
                self.lookup(request).await
            }
        }
    }

    async fn lookup(&self, request: &Request) -> FetchOutcome {
        let namespace = self.config.cache_name.clone();
        let key = request.key();
        match with_storage(&self.storage, move |s| s.match_request(&namespace, &key)).await {
            Ok(Some(cached)) => FetchOutcome::Respond(cached),
            Ok(None) => {
                debug!("No cached response for {}", request.url);
                FetchOutcome::Unfulfilled
            }
            Err(e) => {
                warn!("Cache lookup for {} failed: {}", request.url, e);
                FetchOutcome::Unfulfilled
            }
        }
    }

    /// Number of background cache writes still in flight.
    pub fn pending_writes(&self) -> usize {
        self.writer.pending()
    }

    /// Wait for all background cache writes started so far.
    ///
    /// Responses never wait on this; it exists for shutdown and tests.
    pub async fn settle(&self) {
        self.writer.settle().await;
    }

    pub fn status(&self) -> Result<WorkerStatus> {
        let (state, skip_waiting) = {
            let lifecycle = self
                .lifecycle
                .read()
                .map_err(|e| NetfirstError::Other(format!("Worker state lock poisoned: {}", e)))?;
            (lifecycle.state, lifecycle.skip_waiting)
        };

        Ok(WorkerStatus {
            cache_name: self.config.cache_name.clone(),
            state,
            skip_waiting,
            clients: self.clients.len()?,
            controlled_clients: self.clients.controlled_count(&self.config.cache_name)?,
            pending_writes: self.writer.pending(),
        })
    }
}
