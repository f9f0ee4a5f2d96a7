//! Sync command - Drain the mutation queue now
//!
//! Provides the `fitsync sync` CLI command which:
//! 1. Loads configuration and opens the local database
//! 2. Verifies reachability with the configured probe
//! 3. Runs one drain through the scheduler's drain guard
//! 4. Optionally refreshes every collection from the remote store

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use fitsync_core::{config::Config, domain::Collection};
use fitsync_remote::RestRemoteStore;
use fitsync_sync::{
    ChangeBus, DataService, SyncAttempt, SyncEngine, SyncResult, SyncScheduler, SyncTrigger,
};
use tracing::info;

use super::{checked_connectivity, LocalServices};
use crate::output::{get_formatter, print_serialized, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Also pull every collection from the remote store afterwards
    #[arg(long)]
    pub refresh: bool,
}

impl SyncCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);

        let config = Config::load_or_default(config_path);
        info!(config_path = %config_path.display(), "Loaded configuration");

        let local = LocalServices::open(&config).await?;
        let remote = Arc::new(RestRemoteStore::from_config(&config.remote));
        let connectivity = checked_connectivity(&config).await;
        let bus = ChangeBus::new();

        let engine = Arc::new(
            SyncEngine::new(local.store.clone(), local.queue.clone(), remote.clone())
                .with_max_retries(config.sync.max_retries),
        );
        let handle = SyncScheduler::new(
            engine,
            connectivity.clone(),
            bus.clone(),
            local.queue.clone(),
            &config.sync,
        )
        .handle();

        match handle.try_sync(SyncTrigger::Manual).await {
            SyncAttempt::Completed(result) => print_result(&result, format, &*formatter)?,
            SyncAttempt::Offline => {
                let pending = handle.status().await.pending;
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "online": false,
                        "pending": pending,
                    }));
                } else {
                    formatter.error("Remote store unreachable; mutations stay queued");
                    if let Some(n) = pending {
                        formatter.info(&format!("Pending mutations: {n}"));
                    }
                }
                return Ok(());
            }
            SyncAttempt::Busy => {
                formatter.warn("A sync is already running; try again later");
                return Ok(());
            }
            SyncAttempt::Failed(message) => {
                formatter.error(&message);
                return Ok(());
            }
        }

        if self.refresh {
            let mut data = DataService::new(local.store.clone(), local.queue.clone(), bus)
                .with_remote(remote, connectivity);
            if let Some(tenant) = config.tenant() {
                data = data.with_tenant(tenant);
            }
            data.init().await?;

            for collection in Collection::ALL {
                match data.refresh(collection).await {
                    Ok(summary) => {
                        if format.is_json() {
                            formatter.print_json(&serde_json::json!({
                                "collection": collection,
                                "refresh": summary,
                            }));
                        } else {
                            formatter.info(&format!(
                                "Refreshed {collection}: {} upserted, {} removed, {} kept (pending)",
                                summary.upserted, summary.removed, summary.skipped
                            ));
                        }
                    }
                    Err(e) => formatter.warn(&format!("Refresh of {collection} failed: {e}")),
                }
            }
        }

        Ok(())
    }
}

fn print_result(
    result: &SyncResult,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    if format.is_json() {
        return print_serialized(formatter, result);
    }

    formatter.success(&format!(
        "Synced {} change{} in {} ms",
        result.changes.len(),
        if result.changes.len() == 1 { "" } else { "s" },
        result.duration_ms
    ));
    for change in &result.changes {
        match &change.previous_id {
            Some(previous) => formatter.info(&format!(
                "{} {} {} (was {})",
                change.operation, change.collection, change.id, previous
            )),
            None => formatter.info(&format!(
                "{} {} {}",
                change.operation, change.collection, change.id
            )),
        }
    }
    if result.failed > 0 {
        formatter.warn(&format!("{} mutation(s) failed and stay queued", result.failed));
    }
    if result.deferred > 0 {
        formatter.info(&format!(
            "{} mutation(s) wait for an earlier insert",
            result.deferred
        ));
    }
    if result.exhausted > 0 {
        formatter.warn(&format!(
            "{} mutation(s) reached the retry limit and are skipped",
            result.exhausted
        ));
    }
    Ok(())
}
