//! Install / activate / fetch state machine for one cache generation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::{ClientId, Clients, WorkerError};
use crate::cache::{add_all, CacheStorage, StorageError};
use crate::config::WorkerConfig;
use crate::http::{Request, Response};
use crate::network::Network;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, no lifecycle event run yet.
    #[default]
    Parsed,
    /// Pre-caching the shell.
    Installing,
    /// Shell cached, waiting for activate.
    Installed,
    /// Evicting stale generations and claiming clients.
    Activating,
    /// Serving fetches.
    Activated,
    /// Install failed or the worker was terminated.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Notifications emitted while the worker moves through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    StateChange {
        generation: String,
        state: WorkerState,
    },
    GenerationDeleted {
        name: String,
    },
    ClientsClaimed {
        generation: String,
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub generation: String,
    /// Number of shell resources stored.
    pub resources: usize,
    /// Takeover requested without waiting for open pages to close.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub generation: String,
    /// Stale generations that were deleted.
    pub deleted: Vec<String>,
    /// Cleanup steps that failed; activation went ahead regardless.
    pub failures: Vec<String>,
    /// Pages newly brought under this generation's control.
    pub claimed: usize,
}

/// How a fetch event was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host sends the request itself.
    PassThrough,
    /// Served from the current generation.
    Cache(Response),
    /// Cache miss answered by the network, verbatim.
    Network(Response),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Cache(response) | FetchOutcome::Network(response) => Some(response),
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(self, FetchOutcome::Cache(_))
    }

    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::PassThrough => "pass-through",
            FetchOutcome::Cache(_) => "cache",
            FetchOutcome::Network(_) => "network",
        }
    }
}

pub struct OfflineCacheManager {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    terminated: AtomicBool,
    clients: RwLock<Clients>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl OfflineCacheManager {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            config,
            storage,
            network,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            clients: RwLock::new(Clients::new()),
            events,
        };
        (manager, rx)
    }

    pub fn generation(&self) -> &str {
        self.config.generation().as_str()
    }

    pub fn shell(&self) -> &[Url] {
        self.config.shell()
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether a successful install asked to take over immediately.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    fn emit(&self, event: WorkerEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: WorkerState) {
        self.emit(WorkerEvent::StateChange {
            generation: self.generation().to_string(),
            state,
        });
    }

    /// Move to `to` if the current state is one of `from`.
    async fn transition(
        &self,
        from: &[WorkerState],
        to: WorkerState,
        operation: &'static str,
    ) -> Result<(), WorkerError> {
        let mut state = self.state.write().await;
        if self.terminated.load(Ordering::SeqCst) || !from.contains(&*state) {
            return Err(WorkerError::InvalidState {
                operation,
                state: *state,
            });
        }
        *state = to;
        drop(state);
        self.emit_state(to);
        Ok(())
    }

    /// Unconditional move, ignored once terminated.
    async fn set_state(&self, to: WorkerState) {
        let mut state = self.state.write().await;
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        *state = to;
        drop(state);
        self.emit_state(to);
    }

    /// Pre-cache the shell into the current generation.
    ///
    /// All-or-nothing: if any resource fails, nothing is stored, the worker
    /// becomes redundant and the error is returned. A redundant worker may be
    /// installed again.
    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        self.transition(
            &[WorkerState::Parsed, WorkerState::Redundant],
            WorkerState::Installing,
            "install",
        )
        .await?;
        info!(
            generation = self.generation(),
            resources = self.config.shell().len(),
            "Installing shell"
        );

        match self.populate().await {
            Ok(resources) => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                self.set_state(WorkerState::Installed).await;
                info!(generation = self.generation(), resources, "Shell installed");
                Ok(InstallReport {
                    generation: self.generation().to_string(),
                    resources,
                    skip_waiting: true,
                })
            }
            Err(source) => {
                self.set_state(WorkerState::Redundant).await;
                warn!(generation = self.generation(), error = %source, "Install failed");
                Err(WorkerError::Install {
                    generation: self.generation().to_string(),
                    source,
                })
            }
        }
    }

    async fn populate(&self) -> Result<usize, StorageError> {
        self.storage.open(self.generation()).await?;
        add_all(
            self.storage.as_ref(),
            self.network.as_ref(),
            self.generation(),
            &self.config.shell_requests(),
        )
        .await
    }

    /// Delete every generation except the current one, then claim all open
    /// clients. Cleanup failures are logged and reported but never block
    /// activation.
    pub async fn activate(&self) -> Result<ActivateReport, WorkerError> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating, "activate")
            .await?;

        let current = self.generation();
        let mut report = ActivateReport {
            generation: current.to_string(),
            ..ActivateReport::default()
        };

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate caches, skipping cleanup");
                report.failures.push(format!("enumerate caches: {}", e));
                Vec::new()
            }
        };

        let stale: Vec<String> = names.into_iter().filter(|name| name != current).collect();
        let results = join_all(stale.iter().map(|name| async move {
            (name, self.storage.delete(name).await)
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(true) => {
                    info!(cache = %name, "Deleted stale cache");
                    report.deleted.push(name.clone());
                    self.emit(WorkerEvent::GenerationDeleted { name: name.clone() });
                }
                Ok(false) => debug!(cache = %name, "Stale cache already gone"),
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete stale cache");
                    report.failures.push(format!("delete {}: {}", name, e));
                }
            }
        }

        // Pages opened concurrently see either the claim or the new state
        let mut clients = self.clients.write().await;
        report.claimed = clients.claim(current);
        self.set_state(WorkerState::Activated).await;
        drop(clients);
        self.emit(WorkerEvent::ClientsClaimed {
            generation: current.to_string(),
            count: report.claimed,
        });

        info!(
            generation = current,
            deleted = report.deleted.len(),
            claimed = report.claimed,
            "Worker activated"
        );
        Ok(report)
    }

    /// Answer a fetch event: cache-first for `GET`, pass-through otherwise.
    ///
    /// Network fallbacks are returned as-is and never written to the cache.
    /// A network failure propagates unchanged.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
        if !request.is_read() {
            debug!(method = %request.method, url = %request.url, "Not a read, passing through");
            return Ok(FetchOutcome::PassThrough);
        }
        if self.state().await != WorkerState::Activated {
            return Ok(FetchOutcome::PassThrough);
        }
        if let Some(client_id) = request.client_id {
            if !self.clients.read().await.is_controlled(client_id, self.generation()) {
                debug!(client = %client_id, "Client not controlled, passing through");
                return Ok(FetchOutcome::PassThrough);
            }
        }

        match self.storage.match_request(self.generation(), request).await {
            Ok(Some(response)) => {
                debug!(url = %request.url, "Cache hit");
                return Ok(FetchOutcome::Cache(response));
            }
            Ok(None) => debug!(url = %request.url, "Cache miss"),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed, using network");
            }
        }

        let response = self.network.fetch(request).await?;
        Ok(FetchOutcome::Network(response))
    }

    async fn generation_complete(&self) -> Result<bool, WorkerError> {
        if !self.storage.has(self.generation()).await? {
            return Ok(false);
        }
        for request in self.config.shell_requests() {
            if self
                .storage
                .match_request(self.generation(), &request)
                .await?
                .is_none()
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn restore_to(
        &self,
        target: WorkerState,
        operation: &'static str,
    ) -> Result<bool, WorkerError> {
        let state = self.state().await;
        if state != WorkerState::Parsed {
            return Err(WorkerError::InvalidState { operation, state });
        }
        if !self.generation_complete().await? {
            return Ok(false);
        }
        self.transition(&[WorkerState::Parsed], target, operation).await?;
        info!(generation = self.generation(), state = %target, "Restored installed generation");
        Ok(true)
    }

    /// Pick up a generation installed by an earlier process, ready for
    /// activate. Returns `false` if the store does not hold the full shell.
    pub async fn restore(&self) -> Result<bool, WorkerError> {
        self.restore_to(WorkerState::Installed, "restore").await
    }

    /// Pick up a generation installed and activated by an earlier process and
    /// start serving it directly. Returns `false` if the store does not hold
    /// the full shell.
    pub async fn resume(&self) -> Result<bool, WorkerError> {
        self.restore_to(WorkerState::Activated, "resume").await
    }

    /// Stop serving. Every later fetch passes through.
    pub async fn terminate(&self) {
        let mut state = self.state.write().await;
        self.terminated.store(true, Ordering::SeqCst);
        *state = WorkerState::Redundant;
        drop(state);
        self.emit_state(WorkerState::Redundant);
        info!(generation = self.generation(), "Worker terminated");
    }

    /// Register an open page. A page loaded while this generation is active
    /// is controlled by it straight away; earlier pages wait for a claim.
    pub async fn open_client(&self, url: Url) -> ClientId {
        let mut clients = self.clients.write().await;
        if self.state().await == WorkerState::Activated {
            clients.open_controlled(url, self.generation())
        } else {
            clients.open(url)
        }
    }

    pub async fn close_client(&self, id: ClientId) -> bool {
        self.clients.write().await.close(id).is_some()
    }

    pub async fn is_controlling(&self, id: ClientId) -> bool {
        self.clients.read().await.is_controlled(id, self.generation())
    }

    pub async fn controlled_clients(&self) -> usize {
        self.clients.read().await.controlled_count(self.generation())
    }
}
