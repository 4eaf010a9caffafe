//! Core library for shellcache.
//!
//! shellcache keeps a web application's "shell" (the fixed set of assets it
//! needs to boot) available offline. The [`worker::OfflineCacheManager`]
//! follows the familiar install / activate / fetch lifecycle:
//!
//! - install: pre-cache every shell resource into the current generation
//! - activate: delete every stale generation, then claim open clients
//! - fetch: answer `GET` requests cache-first, falling back to the network
//!
//! Storage and network are pluggable through the [`cache::CacheStorage`]
//! and [`network::Network`] traits.

pub mod cache;
pub mod config;
pub mod http;
pub mod network;
pub mod worker;

pub use cache::{CacheStorage, DiskStorage, GenerationName, MemoryStorage, StorageError};
pub use config::{Config, WorkerConfig};
pub use http::{Headers, Method, Request, Response};
pub use network::{HttpNetwork, Network, NetworkError};
pub use worker::{
    ActivateReport, ClientId, FetchOutcome, InstallReport, OfflineCacheManager, Pending,
    WorkerError, WorkerEvent, WorkerHost, WorkerState,
};
