//! Runs lifecycle events as independent tasks.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

use super::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheManager, WorkerError};
use crate::http::Request;

/// Completion signal for one dispatched event.
///
/// The host treats the event as still running until this settles.
pub struct Pending<T> {
    handle: JoinHandle<Result<T, WorkerError>>,
}

impl<T> Pending<T> {
    /// Wait for the event's work to finish, successfully or not.
    pub async fn settled(self) -> Result<T, WorkerError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(WorkerError::Aborted),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Dispatches install, activate and fetch events to a shared manager.
pub struct WorkerHost {
    manager: Arc<OfflineCacheManager>,
    in_flight: Mutex<Vec<AbortHandle>>,
}

impl WorkerHost {
    pub fn new(manager: Arc<OfflineCacheManager>) -> Self {
        Self {
            manager,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn manager(&self) -> &Arc<OfflineCacheManager> {
        &self.manager
    }

    fn spawn<T, F>(&self, work: F) -> Pending<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, WorkerError>> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle.abort_handle());
        Pending { handle }
    }

    pub fn install(&self) -> Pending<InstallReport> {
        let manager = Arc::clone(&self.manager);
        self.spawn(async move { manager.install().await })
    }

    pub fn activate(&self) -> Pending<ActivateReport> {
        let manager = Arc::clone(&self.manager);
        self.spawn(async move { manager.activate().await })
    }

    pub fn fetch(&self, request: Request) -> Pending<FetchOutcome> {
        let manager = Arc::clone(&self.manager);
        self.spawn(async move { manager.handle_fetch(&request).await })
    }

    /// Install, then activate straight away (skip-waiting).
    pub async fn start(&self) -> Result<ActivateReport, WorkerError> {
        self.install().settled().await?;
        self.activate().settled().await
    }

    /// Abandon every in-flight event and retire the worker.
    pub async fn terminate(&self) {
        let handles: Vec<AbortHandle> = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight.drain(..).collect()
        };
        debug!(tasks = handles.len(), "Aborting in-flight events");
        for handle in handles {
            handle.abort();
        }
        self.manager.terminate().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::cache::{CacheStorage, MemoryStorage};
    use crate::config::WorkerConfig;
    use crate::http::Response;
    use crate::network::{Network, NetworkError};
    use crate::worker::WorkerState;

    struct SlowNetwork {
        delay: Duration,
    }

    #[async_trait]
    impl Network for SlowNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
            tokio::time::sleep(self.delay).await;
            Ok(Response::new(200, request.url.path()))
        }
    }

    fn host(delay: Duration) -> (WorkerHost, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let shell = vec![
            Url::parse("http://localhost/").unwrap(),
            Url::parse("http://localhost/index.html").unwrap(),
        ];
        let (manager, _events) = OfflineCacheManager::new(
            WorkerConfig::new("cache-v1", shell).unwrap(),
            storage.clone(),
            Arc::new(SlowNetwork { delay }),
        );
        (WorkerHost::new(Arc::new(manager)), storage)
    }

    #[tokio::test]
    async fn test_start_installs_and_activates() {
        let (host, storage) = host(Duration::ZERO);
        let report = host.start().await.unwrap();

        assert_eq!(report.generation, "cache-v1");
        assert_eq!(host.manager().state().await, WorkerState::Activated);
        assert_eq!(storage.requests("cache-v1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetches() {
        let (host, _storage) = host(Duration::from_millis(10));
        host.start().await.unwrap();

        let pending: Vec<_> = (0..8)
            .map(|i| {
                let url = Url::parse(&format!("http://localhost/api/{}", i)).unwrap();
                host.fetch(Request::get(url))
            })
            .collect();

        for (i, p) in pending.into_iter().enumerate() {
            let outcome = p.settled().await.unwrap();
            assert_eq!(outcome.source(), "network");
            assert_eq!(outcome.response().unwrap().text(), format!("/api/{}", i));
        }
    }

    #[tokio::test]
    async fn test_terminate_aborts_in_flight_install() {
        let (host, storage) = host(Duration::from_secs(60));
        let pending = host.install();

        tokio::time::sleep(Duration::from_millis(20)).await;
        host.terminate().await;

        assert!(matches!(pending.settled().await, Err(WorkerError::Aborted)));
        assert_eq!(host.manager().state().await, WorkerState::Redundant);
        assert!(storage.requests("cache-v1").await.unwrap().is_empty());
    }
}
