//! The offline cache worker.
//!
//! `OfflineCacheManager` is the install / activate / fetch state machine.
//! `WorkerHost` runs each lifecycle event as its own tokio task and hands
//! back a `Pending` completion signal, the way a browser defers an event
//! until its `waitUntil` promise settles.

pub mod clients;
pub mod error;
pub mod host;
pub mod manager;

pub use clients::{Client, ClientId, Clients};
pub use error::WorkerError;
pub use host::{Pending, WorkerHost};
pub use manager::{
    ActivateReport, FetchOutcome, InstallReport, OfflineCacheManager, WorkerEvent, WorkerState,
};
