use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use super::StorageError;
use crate::http::{CacheKey, Request, Response};
use crate::network::error::truncate_body;
use crate::network::Network;

/// Named request → response stores, enumerable by name.
///
/// Lookups may run concurrently with each other; writes happen in bulk
/// during install.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named cache if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), StorageError>;

    async fn has(&self, name: &str) -> Result<bool, StorageError>;

    /// Names of every cache in the store.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Delete the named cache. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// Look up a stored response for `request` in the named cache.
    /// A missing cache is a miss, not an error.
    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, StorageError>;

    /// Store every pair, creating the cache if needed. An existing entry for
    /// the same request is replaced.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), StorageError>;

    /// Request keys stored in the named cache.
    async fn requests(&self, name: &str) -> Result<Vec<CacheKey>, StorageError>;

    async fn put(
        &self,
        name: &str,
        request: Request,
        response: Response,
    ) -> Result<(), StorageError> {
        self.put_all(name, vec![(request, response)]).await
    }
}

/// Fetch every request and store the responses in the named cache.
///
/// Nothing is written unless every transfer succeeds with a 2xx status.
/// Returns the number of entries stored.
pub async fn add_all(
    storage: &dyn CacheStorage,
    network: &dyn Network,
    name: &str,
    requests: &[Request],
) -> Result<usize, StorageError> {
    for request in requests {
        super::entry::check_cacheable(request)?;
    }

    let responses = try_join_all(requests.iter().map(|request| async move {
        let response = network
            .fetch(request)
            .await
            .map_err(|source| StorageError::Fetch {
                url: request.url.to_string(),
                source,
            })?;
        if !response.is_ok() {
            return Err(StorageError::BadStatus {
                url: request.url.to_string(),
                status: response.status,
                body: truncate_body(&response.text()),
            });
        }
        debug!(url = %request.url, status = response.status, "Fetched resource for cache");
        Ok::<_, StorageError>((request.clone(), response))
    }))
    .await?;

    let count = responses.len();
    storage.put_all(name, responses).await?;
    Ok(count)
}
