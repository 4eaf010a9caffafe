#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shellcache_core::http::CacheKey;
use shellcache_core::{
    CacheStorage, MemoryStorage, Network, NetworkError, OfflineCacheManager, Request, Response,
    StorageError, WorkerConfig, WorkerEvent,
};
use tokio::sync::mpsc;
use url::Url;

pub const ORIGIN: &str = "http://monstrum.test";

pub const SHELL: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/icon.svg",
    "/favicon.svg",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
];

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn get(path: &str) -> Request {
    Request::get(url(path))
}

pub fn worker_config(generation: &str) -> WorkerConfig {
    WorkerConfig::new(generation, SHELL.iter().map(|p| url(p)).collect()).unwrap()
}

/// Network that answers 200 with a per-URL body and counts every call.
/// URLs in `failing` fail at the transport level.
#[derive(Default)]
pub struct CountingNetwork {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    version: Mutex<String>,
}

impl CountingNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            version: Mutex::new("v1".to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn fail(&self, url: &Url) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Change the content served for every URL.
    pub fn deploy(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    pub fn body_for(&self, url: &Url) -> String {
        format!("{} {}", self.version.lock().unwrap(), url)
    }
}

#[async_trait]
impl Network for CountingNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(request.url.as_str()) {
            return Err(NetworkError::Transport {
                url: request.url.to_string(),
                message: "offline".to_string(),
            });
        }
        Ok(Response::new(200, self.body_for(&request.url)).with_header("content-type", "text/plain"))
    }
}

/// Wraps `MemoryStorage`, counts reads and writes, and can be told to fail
/// cache enumeration or deletion.
#[derive(Default)]
pub struct SpyStorage {
    inner: MemoryStorage,
    reads: AtomicUsize,
    writes: AtomicUsize,
    broken_keys: AtomicBool,
    broken_delete: AtomicBool,
}

impl SpyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn break_keys(&self) {
        self.broken_keys.store(true, Ordering::SeqCst);
    }

    pub fn break_delete(&self) {
        self.broken_delete.store(true, Ordering::SeqCst);
    }
}

fn disk_error(operation: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        format!("{} refused", operation),
    ))
}

#[async_trait]
impl CacheStorage for SpyStorage {
    async fn open(&self, name: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        if self.broken_keys.load(Ordering::SeqCst) {
            return Err(disk_error("keys"));
        }
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.broken_delete.load(Ordering::SeqCst) {
            return Err(disk_error("delete"));
        }
        self.inner.delete(name).await
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.match_request(name, request).await
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_all(name, entries).await
    }

    async fn requests(&self, name: &str) -> Result<Vec<CacheKey>, StorageError> {
        self.inner.requests(name).await
    }
}

pub fn manager(
    generation: &str,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
) -> (OfflineCacheManager, mpsc::UnboundedReceiver<WorkerEvent>) {
    OfflineCacheManager::new(worker_config(generation), storage, network)
}
