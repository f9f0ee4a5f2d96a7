//! Records command - List cached records
//!
//! Provides the `fitsync records <collection>` CLI command. Reads go
//! through the same data service the app uses, so the output is exactly
//! what a screen would show offline.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use fitsync_core::{
    config::Config,
    domain::{Collection, EntityRecord, RecordId},
    ports::ILocalStore,
};
use fitsync_sync::{ChangeBus, DataService};

use super::LocalServices;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct RecordsCommand {
    /// Collection to list (clients, schedules, exercises, workouts, progress_entries)
    pub collection: Collection,

    /// Show a single record
    #[arg(long)]
    pub id: Option<RecordId>,

    /// Ignore the tenant scope
    #[arg(long)]
    pub all_tenants: bool,
}

impl RecordsCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let formatter = get_formatter(format);
        let config = Config::load_or_default(config_path);
        let local = LocalServices::open(&config).await?;

        let mut data = DataService::new(local.store.clone(), local.queue.clone(), ChangeBus::new());
        if let Some(tenant) = config.tenant() {
            data = data.with_tenant(tenant);
        }
        data.init().await?;

        let records: Vec<EntityRecord> = match &self.id {
            Some(id) => data.get(self.collection, id).await?.into_iter().collect(),
            None if self.all_tenants => local
                .store
                .get_all(self.collection, None)
                .await
                .with_context(|| format!("Failed to read {}", self.collection))?,
            None => data.list(self.collection).await?,
        };

        if format.is_json() {
            let rows: Vec<serde_json::Value> =
                records.into_iter().map(EntityRecord::into_value).collect();
            formatter.print_json(&serde_json::Value::Array(rows));
            return Ok(());
        }

        if records.is_empty() {
            match &self.id {
                Some(id) => formatter.error(&format!("No {} record with id {id}", self.collection)),
                None => formatter.success(&format!("No cached {}", self.collection)),
            }
            return Ok(());
        }

        formatter.success(&format!("{} cached {}", records.len(), self.collection));
        for record in &records {
            let id = record.id().map_or_else(|| "-".to_string(), |id| id.to_string());
            let marker = if record.has_temporary_id() {
                "  [not synced]"
            } else {
                ""
            };
            formatter.info(&format!("{id}{marker}"));
            let body = serde_json::to_string(record.fields())?;
            formatter.info(&format!("    {body}"));
        }

        Ok(())
    }
}
