//! fitsync Daemon - Background synchronization service
//!
//! This binary keeps the local cache and the remote store converging:
//! - Drains the mutation queue on startup, on reconnect and periodically
//! - Re-probes reachability so reconnects are noticed without platform events
//! - Pulls remote rows for every collection after the startup drain
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! All services are constructed once in [`DaemonService::new`] and injected
//! into each other. The [`SyncScheduler`] loop and the connectivity loop
//! both stop on the same `CancellationToken`, which is cancelled on receipt
//! of SIGTERM or SIGINT. A drain in flight at shutdown runs to completion.

use std::sync::Arc;

use anyhow::{Context, Result};
use fitsync_cache::{DatabasePool, SqliteLocalStore, SqliteMutationQueue};
use fitsync_core::{
    config::Config,
    domain::{ChangeEvent, Collection},
};
use fitsync_remote::{HttpReachabilityProbe, RestRemoteStore};
use fitsync_sync::{
    ChangeBus, ConnectivityMonitor, DataService, SyncEngine, SyncHandle, SyncScheduler,
    SyncTrigger,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// DaemonService
// ============================================================================

/// Wired services of one daemon run
struct DaemonService {
    config: Config,
    connectivity: Arc<ConnectivityMonitor>,
    data: DataService,
    scheduler: SyncScheduler,
    handle: SyncHandle,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database and wires adapters, engine and scheduler
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_path = &config.store.database_path;
        let db = DatabasePool::new(db_path)
            .await
            .context("Failed to open database")?;
        info!(db_path = %db_path.display(), "Opened database");

        let store = Arc::new(SqliteLocalStore::new(db.clone()));
        let queue = Arc::new(SqliteMutationQueue::new(db));
        let remote = Arc::new(RestRemoteStore::from_config(&config.remote));
        let probe = Arc::new(HttpReachabilityProbe::from_config(&config.connectivity));

        let connectivity = Arc::new(ConnectivityMonitor::new(probe));
        let bus = ChangeBus::new();
        bus.subscribe(
            None,
            Arc::new(|event: &ChangeEvent| {
                debug!(
                    collection = %event.collection,
                    kind = ?event.kind,
                    source = ?event.source,
                    entity_id = ?event.id,
                    "Change published"
                );
                Ok(())
            }),
        );

        let mut data = DataService::new(store.clone(), queue.clone(), bus.clone())
            .with_remote(remote.clone(), connectivity.clone())
            .with_atomic_enqueue(config.store.atomic_enqueue);
        if let Some(tenant) = config.tenant() {
            data = data.with_tenant(tenant);
        }
        data.init().await.context("Failed to initialize local store")?;
        if data.tenant().is_none() {
            warn!("No trainer_id configured or cached; remote refresh is not tenant-scoped");
        }

        let engine = Arc::new(
            SyncEngine::new(store, queue.clone(), remote).with_max_retries(config.sync.max_retries),
        );
        let scheduler = SyncScheduler::new(engine, connectivity.clone(), bus, queue, &config.sync);
        let handle = scheduler.handle();

        Ok(Self {
            config,
            connectivity,
            data,
            scheduler,
            handle,
            shutdown,
        })
    }

    /// Runs until shutdown
    ///
    /// 1. Probes reachability; when online, drains and refreshes every
    ///    collection from the remote store
    /// 2. Offline starts wait for the reconnect drain instead
    /// 3. Re-probes on the periodic interval until shutdown
    async fn run(self) -> Result<()> {
        let DaemonService {
            config,
            connectivity,
            data,
            scheduler,
            handle,
            shutdown,
        } = self;

        let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

        let online = connectivity.check().await;
        info!(online, "Initial connectivity check");

        if online {
            // Drain before refreshing so fewer rows are skipped as pending
            handle.try_sync(SyncTrigger::Startup).await;
            refresh_all(&data).await;
        }

        let mut probe_interval = tokio::time::interval(config.sync.periodic_interval());
        probe_interval.tick().await;

        loop {
            tokio::select! {
                _ = probe_interval.tick() => {
                    // Offline-to-online transitions trigger a reconnect drain
                    connectivity.check().await;
                }
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = scheduler_task.await {
            error!(error = %e, "Scheduler task failed");
        }

        let status = handle.status().await;
        info!(pending = ?status.pending, "Sync loop terminated");
        Ok(())
    }
}

/// Pulls every collection, logging failures per collection
async fn refresh_all(data: &DataService) {
    for collection in Collection::ALL {
        match data.refresh(collection).await {
            Ok(summary) => debug!(
                collection = %collection,
                upserted = summary.upserted,
                removed = summary.removed,
                "Startup refresh"
            ),
            Err(e) => warn!(collection = %collection, error = %e, "Startup refresh failed"),
        }
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Logging
// ============================================================================

/// `RUST_LOG` wins over the configured level
fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_or_default(&config_path);
    init_tracing(&config);

    info!(config_path = %config_path.display(), "fitsync daemon starting (fitsyncd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, message = %e.message, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} error(s)", errors.len());
    }

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("fitsync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "fitsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fitsync_core::config::ConfigBuilder;

    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        // Nothing listens on port 9: probes fail fast and the daemon stays offline
        ConfigBuilder::new()
            .store_database_path(dir.path().join("fitsync.db"))
            .remote_base_url("http://127.0.0.1:9")
            .connectivity_probe_url("http://127.0.0.1:9/health")
            .connectivity_probe_timeout_secs(1)
            .auth_trainer_id("trainer-1")
            .build()
    }

    #[tokio::test]
    async fn test_service_wires_and_caches_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let service = DaemonService::new(test_config(&dir), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(service.data.tenant().unwrap().as_str(), "trainer-1");
        let status = service.handle.status().await;
        assert_eq!(status.pending, Some(0));
        assert!(!status.is_syncing);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let service = DaemonService::new(test_config(&dir), token.clone())
            .await
            .unwrap();

        let task = tokio::spawn(service.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("daemon stops")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_cancellation_token_child_propagation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }
}
