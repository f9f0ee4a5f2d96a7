//! Offline-first data service
//!
//! [`DataService`] is what screens and data hooks talk to. Reads come from
//! the local store only; writes commit locally first, then queue the
//! mutation for the sync engine, then publish a change event.
//!
//! ## Write Contract
//!
//! - A write returns only after the local commit.
//! - Fatal storage failure is an `Err`; a failed enqueue after a successful
//!   local commit is reported as [`WriteOutcome::EnqueueFailed`] and the
//!   local write stays in place.
//! - `local_only` writes skip the queue. The sync engine and remote
//!   refresh use them to mirror server state without echoing it back.
//! - With `atomic_enqueue`, the entity write and the queue entry share one
//!   transaction and `EnqueueFailed` cannot happen.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use fitsync_core::domain::{
    record::TRAINER_ID_FIELD, ChangeEvent, ChangeSource, Collection, EntityRecord,
    MutationEntry, Operation, RecordId, TenantId,
};
use fitsync_core::ports::{ILocalStore, IMutationQueue, IRemoteStore, RemoteFilter};

use crate::bus::ChangeBus;
use crate::connectivity::ConnectivityMonitor;
use crate::SyncError;

// ============================================================================
// Write results
// ============================================================================

/// What happened to the outbound half of a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Committed locally and queued for sync
    Queued { entry_id: String },
    /// Committed locally; no queue entry was requested
    LocalOnly,
    /// Committed locally, but the queue entry could not be written
    EnqueueFailed { reason: String },
}

/// A committed local write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Record as stored locally (deleted records: as they were before)
    pub record: EntityRecord,
    pub outcome: WriteOutcome,
}

impl WriteResult {
    pub fn is_queued(&self) -> bool {
        matches!(self.outcome, WriteOutcome::Queued { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Skip the mutation queue
    pub local_only: bool,
}

impl WriteOptions {
    pub fn local_only() -> Self {
        Self { local_only: true }
    }
}

/// Counts from a remote refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Remote rows written locally
    pub upserted: u32,
    /// Local records no longer present remotely
    pub removed: u32,
    /// Remote rows left alone because local writes are still queued
    pub skipped: u32,
}

// ============================================================================
// DataService
// ============================================================================

/// Hook-facing facade over the local store, queue and change bus
pub struct DataService {
    store: Arc<dyn ILocalStore>,
    queue: Arc<dyn IMutationQueue>,
    bus: Arc<ChangeBus>,
    tenant: Option<TenantId>,
    remote: Option<(Arc<dyn IRemoteStore>, Arc<ConnectivityMonitor>)>,
    atomic_enqueue: bool,
}

impl DataService {
    pub fn new(
        store: Arc<dyn ILocalStore>,
        queue: Arc<dyn IMutationQueue>,
        bus: Arc<ChangeBus>,
    ) -> Self {
        Self {
            store,
            queue,
            bus,
            tenant: None,
            remote: None,
            atomic_enqueue: false,
        }
    }

    /// Scopes reads and new records to the authenticated tenant
    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Enables [`refresh`](DataService::refresh)
    pub fn with_remote(
        mut self,
        remote: Arc<dyn IRemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        self.remote = Some((remote, connectivity));
        self
    }

    pub fn with_atomic_enqueue(mut self, atomic: bool) -> Self {
        self.atomic_enqueue = atomic;
        self
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    /// Opens the store and reconciles the tenant with the cached one
    ///
    /// A configured tenant is cached for later offline starts. Without
    /// one, the cached tenant (if any) is used.
    ///
    /// # Errors
    /// [`SyncError::Storage`] if durable storage is unavailable.
    pub async fn init(&mut self) -> Result<(), SyncError> {
        self.store.initialize().await.map_err(SyncError::storage)?;

        match &self.tenant {
            Some(tenant) => {
                self.store
                    .set_cached_tenant(tenant)
                    .await
                    .map_err(SyncError::storage)?;
            }
            None => {
                self.tenant = self
                    .store
                    .cached_tenant()
                    .await
                    .map_err(SyncError::storage)?;
                if let Some(tenant) = &self.tenant {
                    debug!(tenant = %tenant, "Using cached tenant");
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every record of the collection visible to the tenant
    pub async fn list(&self, collection: Collection) -> Result<Vec<EntityRecord>, SyncError> {
        self.store
            .get_all(collection, self.tenant.as_ref())
            .await
            .map_err(SyncError::storage)
    }

    pub async fn get(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<EntityRecord>, SyncError> {
        self.store
            .get_by_id(collection, id)
            .await
            .map_err(SyncError::storage)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Stores a new record (temporary id if none is given)
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn create_item(
        &self,
        collection: Collection,
        mut record: EntityRecord,
        options: WriteOptions,
    ) -> Result<WriteResult, SyncError> {
        if record.trainer_id().is_none() {
            if let Some(tenant) = &self.tenant {
                record.set_trainer_id(tenant);
            }
        }
        self.write(collection, Operation::Insert, record, options)
            .await
    }

    /// Merges `patch` into an existing record; the id cannot change
    #[tracing::instrument(skip_all, fields(collection = %collection, entity_id = %id))]
    pub async fn update_item(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: EntityRecord,
        options: WriteOptions,
    ) -> Result<WriteResult, SyncError> {
        let mut record = self.require(collection, id).await?;
        record.merge(&patch);
        record.set_id(id);
        self.write(collection, Operation::Update, record, options)
            .await
    }

    /// Removes a record; the queued DELETE carries its last known state
    #[tracing::instrument(skip_all, fields(collection = %collection, entity_id = %id))]
    pub async fn delete_item(
        &self,
        collection: Collection,
        id: &RecordId,
        options: WriteOptions,
    ) -> Result<WriteResult, SyncError> {
        let record = self.require(collection, id).await?;
        self.write(collection, Operation::Delete, record, options)
            .await
    }

    async fn require(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<EntityRecord, SyncError> {
        self.get(collection, id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                collection,
                id: id.to_string(),
            })
    }

    async fn write(
        &self,
        collection: Collection,
        operation: Operation,
        record: EntityRecord,
        options: WriteOptions,
    ) -> Result<WriteResult, SyncError> {
        let result = if options.local_only {
            let record = self.commit_local(collection, operation, record).await?;
            WriteResult {
                record,
                outcome: WriteOutcome::LocalOnly,
            }
        } else if self.atomic_enqueue {
            let committed = self
                .store
                .commit_with_mutation(collection, operation, record)
                .await
                .map_err(SyncError::storage)?;
            WriteResult {
                record: committed.record,
                outcome: WriteOutcome::Queued {
                    entry_id: committed.entry.id,
                },
            }
        } else {
            let record = self.commit_local(collection, operation, record).await?;
            let entry = MutationEntry::new(collection, operation, record.clone());
            let outcome = match self.queue.enqueue(&entry).await {
                Ok(()) => WriteOutcome::Queued { entry_id: entry.id },
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!(
                        collection = %collection,
                        operation = %operation,
                        entity_id = ?record.id(),
                        error = %reason,
                        "Local write committed but could not be queued"
                    );
                    WriteOutcome::EnqueueFailed { reason }
                }
            };
            WriteResult { record, outcome }
        };

        self.bus.publish(&ChangeEvent::new(
            collection,
            operation.into(),
            result.record.id().map(String::from),
            ChangeSource::Local,
        ));
        Ok(result)
    }

    async fn commit_local(
        &self,
        collection: Collection,
        operation: Operation,
        record: EntityRecord,
    ) -> Result<EntityRecord, SyncError> {
        match operation {
            Operation::Insert | Operation::Update => self
                .store
                .put(collection, record)
                .await
                .map_err(SyncError::storage),
            Operation::Delete => {
                if let Some(id) = record.id() {
                    self.store
                        .delete(collection, &id)
                        .await
                        .map_err(SyncError::storage)?;
                }
                Ok(record)
            }
        }
    }

    // ========================================================================
    // Remote refresh
    // ========================================================================

    /// Pulls the tenant's rows for one collection from the remote store
    ///
    /// Rows are stored as local-only writes. Records with queued local
    /// changes are left untouched so pending edits are not overwritten;
    /// local records that no longer exist remotely are removed unless they
    /// are still temporary or queued.
    ///
    /// # Errors
    /// - [`SyncError::Remote`] if no remote store is configured or the
    ///   select fails
    /// - [`SyncError::Offline`] if the client is offline
    #[tracing::instrument(skip_all, fields(collection = %collection))]
    pub async fn refresh(&self, collection: Collection) -> Result<RefreshSummary, SyncError> {
        let (remote, connectivity) = self
            .remote
            .as_ref()
            .ok_or_else(|| SyncError::Remote("no remote store configured".to_string()))?;
        if !connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        let mut filter = RemoteFilter::new();
        if let Some(tenant) = &self.tenant {
            filter = filter.eq(TRAINER_ID_FIELD, tenant.as_str());
        }
        let rows = remote
            .select(collection, &filter)
            .await
            .map_err(|e| SyncError::Remote(format!("{e:#}")))?;

        let pending: HashSet<RecordId> = self
            .queue
            .drain_all()
            .await
            .map_err(|e| SyncError::QueueUnavailable(format!("{e:#}")))?
            .into_iter()
            .filter(|entry| entry.collection == collection)
            .filter_map(|entry| entry.entity_id())
            .collect();

        let mut summary = RefreshSummary::default();
        let mut remote_ids = HashSet::with_capacity(rows.len());

        for row in rows {
            let Some(id) = row.id() else {
                warn!(collection = %collection, "Remote row without id ignored");
                summary.skipped += 1;
                continue;
            };
            remote_ids.insert(id.clone());
            if pending.contains(&id) {
                debug!(entity_id = %id, "Keeping local record with queued changes");
                summary.skipped += 1;
                continue;
            }
            self.store
                .put(collection, row)
                .await
                .map_err(SyncError::storage)?;
            summary.upserted += 1;
        }

        for record in self.list(collection).await? {
            let Some(id) = record.id() else { continue };
            if id.is_temporary() || remote_ids.contains(&id) || pending.contains(&id) {
                continue;
            }
            self.store
                .delete(collection, &id)
                .await
                .map_err(SyncError::storage)?;
            summary.removed += 1;
        }

        self.bus.publish(&ChangeEvent::refresh(collection));
        info!(
            collection = %collection,
            upserted = summary.upserted,
            removed = summary.removed,
            skipped = summary.skipped,
            "Collection refreshed from remote"
        );
        Ok(summary)
    }
}
