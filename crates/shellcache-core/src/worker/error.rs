use thiserror::Error;

use super::WorkerState;
use crate::cache::StorageError;
use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install of {generation} failed: {source}")]
    Install {
        generation: String,
        #[source]
        source: StorageError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Cannot {operation} while worker is {state}")]
    InvalidState {
        operation: &'static str,
        state: WorkerState,
    },

    #[error("Event task was aborted before it settled")]
    Aborted,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
