//! fitsync Cache - Local store and mutation queue
//!
//! SQLite-based persistence for:
//! - Cached entity collections (clients, schedules, exercises, workouts,
//!   progress entries), each indexed by tenant
//! - The mutation queue of pending outbound writes
//! - Store metadata (cached tenant identifier)
//!
//! ## Architecture
//!
//! This crate implements the `ILocalStore` and `IMutationQueue` ports from
//! `fitsync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with idempotent schema setup
//! - [`SqliteLocalStore`] - `ILocalStore` implementation
//! - [`SqliteMutationQueue`] - `IMutationQueue` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use fitsync_cache::{DatabasePool, SqliteLocalStore, SqliteMutationQueue};
//! use fitsync_core::ports::ILocalStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/fitsync/fitsync.db")).await?;
//! let store = SqliteLocalStore::new(pool.clone());
//! let queue = SqliteMutationQueue::new(pool);
//! store.initialize().await?;
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod queue;
pub mod store;

pub use pool::DatabasePool;
pub use queue::SqliteMutationQueue;
pub use store::SqliteLocalStore;

/// Failures of the SQLite cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache file or directory could not be opened
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The schema script failed; the cache cannot be used
    #[error("cache schema setup failed: {0}")]
    Schema(String),

    /// A stored row could not be decoded
    #[error("corrupt cache row: {0}")]
    CorruptRow(String),

    #[error("record has no id")]
    MissingId,
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::CorruptRow(e.to_string())
    }
}
