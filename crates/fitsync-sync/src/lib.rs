//! fitsync Sync - Offline-first synchronization
//!
//! Provides:
//! - Replay of the mutation queue against the remote store
//! - Temporary-to-permanent identifier reconciliation
//! - Verified online/offline tracking
//! - Debounced, non-overlapping sync scheduling
//! - In-process change notifications with cross-context relay
//!
//! ## Modules
//!
//! - [`engine`] - Queue drain and identifier reconciliation
//! - [`connectivity`] - Reachability-verified online state
//! - [`scheduler`] - Single trigger channel, debounce, drain guard
//! - [`bus`] - Change notification bus
//! - [`data`] - Offline-first data service consumed by UI layers

pub mod bus;
pub mod connectivity;
pub mod data;
pub mod engine;
pub mod scheduler;

use fitsync_core::domain::{Collection, DomainError};
use thiserror::Error;

pub use bus::{ChangeBus, CrossContextChannel, Subscription};
pub use connectivity::{ConnectivityMonitor, PlatformEvent};
pub use data::{DataService, RefreshSummary, WriteOptions, WriteOutcome, WriteResult};
pub use engine::{SyncEngine, SyncResult, SyncedChange};
pub use scheduler::{Debouncer, SyncAttempt, SyncHandle, SyncScheduler, SyncStatus, SyncTrigger};

/// Errors that can occur during synchronization and data operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mutation queue could not be read at all
    #[error("Mutation queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Durable local storage failed
    #[error("Local storage unavailable: {0}")]
    Storage(String),

    /// The record to update or delete does not exist locally
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    /// A remote-store call made on behalf of the caller failed
    #[error("Remote store error: {0}")]
    Remote(String),

    /// The operation needs connectivity and the client is offline
    #[error("Offline")]
    Offline,

    /// A domain-level error propagated from fitsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
}

impl SyncError {
    /// Wraps a local store failure
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{err:#}"))
    }
}
