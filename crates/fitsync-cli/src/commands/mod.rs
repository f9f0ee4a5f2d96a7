//! CLI subcommands
//!
//! Every command loads the configuration itself and opens only what it
//! needs through [`LocalServices`].

pub mod config;
pub mod queue;
pub mod records;
pub mod status;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use fitsync_cache::{DatabasePool, SqliteLocalStore, SqliteMutationQueue};
use fitsync_core::config::Config;
use fitsync_remote::HttpReachabilityProbe;
use fitsync_sync::ConnectivityMonitor;

/// Local store and queue over the configured database
pub struct LocalServices {
    pub store: Arc<SqliteLocalStore>,
    pub queue: Arc<SqliteMutationQueue>,
}

impl LocalServices {
    /// Opens the database and ensures the schema exists
    pub async fn open(config: &Config) -> Result<Self> {
        let db = DatabasePool::new(&config.store.database_path)
            .await
            .context("Failed to open database")?;
        db.initialize()
            .await
            .context("Failed to initialize database schema")?;

        Ok(Self {
            store: Arc::new(SqliteLocalStore::new(db.clone())),
            queue: Arc::new(SqliteMutationQueue::new(db)),
        })
    }
}

/// Connectivity monitor over the configured probe, already checked once
pub async fn checked_connectivity(config: &Config) -> Arc<ConnectivityMonitor> {
    let probe = Arc::new(HttpReachabilityProbe::from_config(&config.connectivity));
    let monitor = Arc::new(ConnectivityMonitor::new(probe));
    monitor.check().await;
    monitor
}
