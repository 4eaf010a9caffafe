//! Configuration management.
//!
//! `Config` is the on-disk settings file: the current generation name, the
//! shell resource list, the origin relative shell paths resolve against and
//! the cache location. It is stored at `~/.config/shellcache/config.json`.
//!
//! `WorkerConfig` is the validated form handed to the worker.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::GenerationName;
use crate::http::Request;
use crate::worker::WorkerError;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Bump on every deployment so activate evicts the previous generation.
pub const DEFAULT_GENERATION: &str = "monstrum-rpg-cache-v1";

/// Assets the app needs to boot offline.
pub const DEFAULT_SHELL_URLS: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/icon.svg",
    "/favicon.svg",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
];

const DEFAULT_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: String,
    pub shell_urls: Vec<String>,
    pub origin: String,
    pub cache_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation: DEFAULT_GENERATION.to_string(),
            shell_urls: DEFAULT_SHELL_URLS.iter().map(|s| s.to_string()).collect(),
            origin: DEFAULT_ORIGIN.to_string(),
            cache_dir: None,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn origin_url(&self) -> Result<Url, WorkerError> {
        Url::parse(&self.origin)
            .map_err(|e| WorkerError::Config(format!("invalid origin {}: {}", self.origin, e)))
    }

    /// Resolve a possibly relative URL against the configured origin.
    pub fn resolve(&self, url: &str) -> Result<Url, WorkerError> {
        self.origin_url()?
            .join(url)
            .map_err(|e| WorkerError::Config(format!("invalid url {}: {}", url, e)))
    }

    pub fn worker_config(&self) -> Result<WorkerConfig, WorkerError> {
        let shell = self
            .shell_urls
            .iter()
            .map(|url| self.resolve(url))
            .collect::<Result<Vec<_>, _>>()?;
        WorkerConfig::new(&self.generation, shell)
    }
}

/// Validated worker settings: the current generation and the shell
/// resource set, in order.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    generation: GenerationName,
    shell: Vec<Url>,
}

impl WorkerConfig {
    pub fn new(generation: &str, shell: Vec<Url>) -> Result<Self, WorkerError> {
        let generation =
            GenerationName::new(generation).map_err(|e| WorkerError::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        for url in &shell {
            if !seen.insert(Request::get(url.clone()).cache_key()) {
                return Err(WorkerError::Config(format!(
                    "duplicate shell resource: {}",
                    url
                )));
            }
        }

        Ok(Self { generation, shell })
    }

    pub fn generation(&self) -> &GenerationName {
        &self.generation
    }

    pub fn shell(&self) -> &[Url] {
        &self.shell
    }

    pub fn shell_requests(&self) -> Vec<Request> {
        self.shell.iter().cloned().map(Request::get).collect()
    }
}
