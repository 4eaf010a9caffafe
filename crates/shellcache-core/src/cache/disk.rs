//! File-backed cache store.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <cache_dir>/
//!     <generation>/
//!         <sha256(key)>.json              metadata wrapped in CachedData
//!         <sha256(key)>-<nonce>.body      raw response body
//! ```
//!
//! Every write gets a fresh body file, named in the metadata. The body is
//! written first and the metadata last, each via a temporary file and a
//! rename, so metadata only ever names a complete body and a reader never
//! pairs one write's status and headers with another write's body. The
//! replaced body is removed once the new metadata is in place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entry::{check_cacheable, format_age, CachedData, CachedEntry, VaryCapture};
use super::{CacheStorage, GenerationName, StorageError};
use crate::http::{CacheKey, Headers, Request, Response};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";
const TMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: CacheKey,
    url: String,
    vary: VaryCapture,
    status: u16,
    headers: Headers,
    /// Body file name within the generation directory.
    body_file: String,
}

/// Entry count and freshness of one generation on disk.
#[derive(Debug, Clone)]
pub struct GenerationStats {
    pub name: String,
    pub entries: usize,
    pub newest: Option<DateTime<Utc>>,
}

impl GenerationStats {
    pub fn age_display(&self) -> String {
        self.newest
            .map(format_age)
            .unwrap_or_else(|| "never".to_string())
    }
}

pub struct DiskStorage {
    cache_dir: PathBuf,
}

impl DiskStorage {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn generation_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        GenerationName::validate(name)?;
        Ok(self.cache_dir.join(name))
    }

    fn meta_path(dir: &Path, key: &CacheKey) -> PathBuf {
        dir.join(format!("{}.{}", key.digest(), META_EXT))
    }

    /// A body file name no earlier write of `key` has used.
    fn new_body_file(key: &CacheKey) -> String {
        static WRITES: AtomicU64 = AtomicU64::new(0);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = WRITES.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:x}-{:x}.{}", key.digest(), nanos, seq, BODY_EXT)
    }

    async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".");
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn load_meta(path: &Path) -> Result<Option<CachedData<EntryMeta>>, StorageError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn load_all_meta(&self, name: &str) -> Result<Vec<CachedData<EntryMeta>>, StorageError> {
        let dir = self.generation_dir(name)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut metas = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            if let Some(meta) = Self::load_meta(&path).await? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }

    /// Entry count and newest write time for a generation.
    pub async fn stats(&self, name: &str) -> Result<GenerationStats, StorageError> {
        let metas = self.load_all_meta(name).await?;
        Ok(GenerationStats {
            name: name.to_string(),
            entries: metas.len(),
            newest: metas.iter().map(|m| m.cached_at).max(),
        })
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<(), StorageError> {
        let dir = self.generation_dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.generation_dir(name)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut read_dir = tokio::fs::read_dir(&self.cache_dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if GenerationName::validate(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.generation_dir(name)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(cache = name, "Deleted cache directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_request(
        &self,
        name: &str,
        request: &Request,
    ) -> Result<Option<Response>, StorageError> {
        if !request.is_read() {
            return Ok(None);
        }
        let dir = self.generation_dir(name)?;
        let key = request.cache_key();

        let Some(cached) = Self::load_meta(&Self::meta_path(&dir, &key)).await? else {
            return Ok(None);
        };
        let meta = cached.data;
        if meta.key != key || !meta.vary.matches(&request.headers) {
            return Ok(None);
        }

        let body = match tokio::fs::read(dir.join(&meta.body_file)).await {
            Ok(body) => body,
            // Replaced by a newer write since the metadata was read
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(cache = name, key = %key, "Body replaced during lookup");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Response {
            status: meta.status,
            headers: meta.headers,
            body,
        }))
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(Request, Response)>,
    ) -> Result<(), StorageError> {
        let dir = self.generation_dir(name)?;
        for (request, _) in &entries {
            check_cacheable(request)?;
        }
        tokio::fs::create_dir_all(&dir).await?;

        for (request, response) in entries {
            let entry = CachedEntry::new(&request, response);
            let meta_path = Self::meta_path(&dir, &entry.key);
            // Unreadable old metadata only means its body cannot be cleaned up
            let replaced = Self::load_meta(&meta_path).await.ok().flatten();

            let body_file = Self::new_body_file(&entry.key);
            Self::write_atomic(&dir.join(&body_file), &entry.response.body).await?;
            let meta = CachedData::new(EntryMeta {
                key: entry.key.clone(),
                url: entry.url,
                vary: entry.vary,
                status: entry.response.status,
                headers: entry.response.headers,
                body_file,
            });
            let contents = serde_json::to_string_pretty(&meta)?;
            Self::write_atomic(&meta_path, contents.as_bytes()).await?;

            if let Some(old) = replaced {
                Self::remove_if_present(&dir.join(&old.data.body_file)).await?;
            }
        }
        Ok(())
    }

    async fn requests(&self, name: &str) -> Result<Vec<CacheKey>, StorageError> {
        let mut keys: Vec<CacheKey> = self
            .load_all_meta(name)
            .await?
            .into_iter()
            .map(|m| m.data.key)
            .collect();
        keys.sort();
        Ok(keys)
    }
}
