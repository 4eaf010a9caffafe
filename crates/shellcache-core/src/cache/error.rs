use thiserror::Error;

use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid cache name {0}")]
    InvalidName(String),

    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Request cannot be cached: {0}")]
    NotCacheable(String),

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error("Bad response for {url}: status {status}: {body}")]
    BadStatus { url: String, status: u16, body: String },
}
