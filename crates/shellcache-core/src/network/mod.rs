//! Network access for cache misses and shell pre-caching.
//!
//! The worker only talks to the network through the [`Network`] trait so
//! tests can count or fail transfers. [`HttpNetwork`] is the reqwest-backed
//! implementation used by the CLI.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::http::{Request, Response};

pub use client::HttpNetwork;
pub use error::NetworkError;

/// Performs one transfer for a request descriptor.
///
/// Any HTTP status is a successful transfer; only transport failures are
/// errors. Implementations must not retry.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}
