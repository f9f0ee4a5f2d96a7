//! Queue command - List queued mutations
//!
//! Provides the `fitsync queue` CLI command, which prints pending entries
//! in drain order with their retry state.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use fitsync_core::{
    config::Config,
    domain::{Collection, MutationEntry},
    ports::IMutationQueue,
};

use super::LocalServices;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct QueueCommand {
    /// Only show entries for this collection
    #[arg(long)]
    pub collection: Option<Collection>,

    /// Only show entries that failed at least once
    #[arg(long)]
    pub failed: bool,
}

impl QueueCommand {
    fn keep(&self, entry: &MutationEntry) -> bool {
        self.collection.map_or(true, |c| entry.collection == c)
            && (!self.failed || entry.retry_count > 0)
    }

    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);
        let local = LocalServices::open(&config).await?;

        let entries: Vec<MutationEntry> = local
            .queue
            .drain_all()
            .await
            .context("Failed to read mutation queue")?
            .into_iter()
            .filter(|e| self.keep(e))
            .collect();

        if format.is_json() {
            let rows: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "id": e.id,
                        "collection": e.collection,
                        "operation": e.operation,
                        "entity_id": e.entity_id(),
                        "enqueued_at": e.enqueued_at.to_rfc3339(),
                        "retry_count": e.retry_count,
                        "last_error": e.last_error,
                        "waiting_for_insert": e.is_waiting_for_insert(),
                    })
                })
                .collect();
            formatter.print_json(&serde_json::Value::Array(rows));
            return Ok(());
        }

        if entries.is_empty() {
            formatter.success("Mutation queue is empty");
            return Ok(());
        }

        formatter.success(&format!("{} queued mutation(s)", entries.len()));
        for e in &entries {
            let entity = e
                .entity_id()
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            let mut line = format!(
                "{} {:<7} {:<16} {}",
                e.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
                e.operation.as_str(),
                e.collection.as_str(),
                entity
            );
            if e.is_waiting_for_insert() {
                line.push_str("  [waiting for insert]");
            }
            if e.retry_count > 0 {
                line.push_str(&format!("  [retries: {}]", e.retry_count));
            }
            formatter.info(&line);
            if let Some(err) = &e.last_error {
                formatter.info(&format!("    last error: {err}"));
            }
        }

        Ok(())
    }
}
