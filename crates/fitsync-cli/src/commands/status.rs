//! Status command - Display connectivity and pending work
//!
//! Provides the `fitsync status` CLI command which shows:
//! 1. Whether the remote store is reachable (active probe)
//! 2. The tenant the cache is scoped to
//! 3. Pending, failing and exhausted queue entries
//! 4. Cached record counts per collection

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use fitsync_core::{
    config::Config,
    domain::{Collection, MutationEntry},
    ports::{ILocalStore, IMutationQueue},
};
use tracing::info;

use super::{checked_connectivity, LocalServices};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Skip the reachability probe
    #[arg(long)]
    pub offline: bool,
}

/// Queue entries grouped by health
#[derive(Debug, Default, PartialEq, Eq)]
struct QueueHealth {
    pending: usize,
    failing: usize,
    exhausted: usize,
}

fn queue_health(entries: &[MutationEntry], max_retries: Option<u32>) -> QueueHealth {
    let mut health = QueueHealth {
        pending: entries.len(),
        ..QueueHealth::default()
    };
    for entry in entries {
        if max_retries.is_some_and(|max| entry.retry_count >= max) {
            health.exhausted += 1;
        } else if entry.retry_count > 0 {
            health.failing += 1;
        }
    }
    health
}

impl StatusCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);

        if !config.store.database_path.exists() {
            formatter.error("No local database found. Start fitsyncd or run 'fitsync sync' first.");
            return Ok(());
        }

        let local = LocalServices::open(&config).await?;
        let online = if self.offline {
            None
        } else {
            Some(checked_connectivity(&config).await.is_online())
        };

        let tenant = match config.tenant() {
            Some(t) => Some(t),
            None => local
                .store
                .cached_tenant()
                .await
                .context("Failed to read cached tenant")?,
        };
        info!(tenant = ?tenant, "Showing status");

        let entries = local
            .queue
            .drain_all()
            .await
            .context("Failed to read mutation queue")?;
        let health = queue_health(&entries, config.sync.max_retries);

        let mut counts = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let records = local
                .store
                .get_all(collection, tenant.as_ref())
                .await
                .with_context(|| format!("Failed to read {collection}"))?;
            counts.push((collection, records.len()));
        }

        if format.is_json() {
            let collections: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(c, n)| (c.to_string(), serde_json::json!(n)))
                .collect();
            formatter.print_json(&serde_json::json!({
                "online": online,
                "tenant": tenant.as_ref().map(|t| t.as_str()),
                "pending": health.pending,
                "failing": health.failing,
                "exhausted": health.exhausted,
                "collections": collections,
            }));
            return Ok(());
        }

        formatter.success("fitsync status");
        formatter.info("");
        formatter.field(
            "Connectivity",
            match online {
                Some(true) => "online",
                Some(false) => "offline",
                None => "not checked",
            },
        );
        formatter.field("Tenant", tenant.as_ref().map_or("none", |t| t.as_str()));
        formatter.field("Pending mutations", &health.pending.to_string());
        if health.failing > 0 {
            formatter.warn(&format!("{} mutation(s) failed at least once", health.failing));
        }
        if health.exhausted > 0 {
            formatter.warn(&format!(
                "{} mutation(s) reached the retry limit",
                health.exhausted
            ));
        }
        formatter.info("");
        formatter.info("Cached records:");
        for (collection, n) in counts {
            formatter.field(collection.as_str(), &n.to_string());
        }

        Ok(())
    }
}
