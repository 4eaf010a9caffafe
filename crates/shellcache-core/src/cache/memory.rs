use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entry::{check_cacheable, CachedData, CachedEntry};
use super::{CacheStorage, GenerationName, StorageError};
use crate::http::{CacheKey, Request, Response};

type Generation = HashMap<CacheKey, CachedData<CachedEntry>>;

/// In-process cache store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    caches: RwLock<BTreeMap<String, Generation>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), StorageError> {
        GenerationName::validate(name)?;
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, StorageError> {
        let caches = self.caches.read().await;
        let Some(generation) = caches.get(name) else {
            return Ok(None);
        };
        Ok(generation
            .get(&request.cache_key())
            .filter(|cached| cached.data.matches(request))
            .map(|cached| cached.data.response.clone()))
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), StorageError> {
        GenerationName::validate(name)?;
        for (request, _) in &entries {
            check_cacheable(request)?;
        }

        let mut caches = self.caches.write().await;
        let generation = caches.entry(name.to_string()).or_default();
        for (request, response) in entries {
            let entry = CachedEntry::new(&request, response);
            generation.insert(entry.key.clone(), CachedData::new(entry));
        }
        Ok(())
    }

    async fn requests(&self, name: &str) -> Result<Vec<CacheKey>, StorageError> {
        let caches = self.caches.read().await;
        let generation = caches
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let mut keys: Vec<CacheKey> = generation.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
