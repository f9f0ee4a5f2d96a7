//! Mutation queue replay engine
//!
//! The [`SyncEngine`] drains the mutation queue against the remote store,
//! one entry at a time, in stored order.
//!
//! ## Drain Flow
//!
//! 1. **Snapshot**: read every queued entry. Entries enqueued after this
//!    point wait for the next drain.
//! 2. **Defer**: UPDATE/DELETE entries still keyed by a temporary id are
//!    skipped and stay queued until their INSERT has been confirmed.
//! 3. **Dispatch**: INSERT (temporary id stripped), UPDATE (full payload)
//!    or DELETE (by id).
//! 4. **Reconcile**: after a confirmed INSERT of a temporary record, the
//!    local record moves to the permanent id, queued entries for that
//!    entity are rewritten and the INSERT entry is removed, all in one
//!    local transaction.
//! 5. **Bookkeeping**: success removes the entry; failure increments its
//!    retry count and the drain moves on.
//!
//! If the reconcile transaction fails, the permanent id is stored on the
//! INSERT entry and the entry counts as failed. The next drain retries the
//! reconcile without sending the INSERT again.
//!
//! ## Error Policy
//!
//! A failing entry never aborts the drain. `process_queue` only returns an
//! error when the queue cannot be read.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use fitsync_core::domain::{Collection, EntityRecord, MutationEntry, Operation, RecordId};
use fitsync_core::ports::{ILocalStore, IMutationQueue, IRemoteStore};

use crate::SyncError;

// ============================================================================
// SyncResult
// ============================================================================

/// A queue entry confirmed by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedChange {
    pub collection: Collection,
    pub operation: Operation,
    /// Permanent id of the affected record
    pub id: RecordId,
    /// Temporary id the record carried before a confirmed INSERT
    pub previous_id: Option<RecordId>,
}

/// Summary of one drain
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    /// Entries applied remotely and removed from the queue
    pub changes: Vec<SyncedChange>,
    /// Entries whose remote call failed this time
    pub failed: u32,
    /// UPDATE/DELETE entries waiting for their INSERT
    pub deferred: u32,
    /// Entries skipped because they reached the retry ceiling
    pub exhausted: u32,
    /// Wall-clock duration of the drain in milliseconds
    pub duration_ms: u64,
}

impl SyncResult {
    /// True if nothing reached the remote store
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Replays queued local mutations against the remote store
///
/// ## Dependencies
///
/// - `local_store`: cached records, rewritten on id replacement
/// - `queue`: pending mutations
/// - `remote`: backend table API
/// - `max_retries`: optional ceiling after which entries are skipped
pub struct SyncEngine {
    local_store: Arc<dyn ILocalStore>,
    queue: Arc<dyn IMutationQueue>,
    remote: Arc<dyn IRemoteStore>,
    max_retries: Option<u32>,
}

impl SyncEngine {
    pub fn new(
        local_store: Arc<dyn ILocalStore>,
        queue: Arc<dyn IMutationQueue>,
        remote: Arc<dyn IRemoteStore>,
    ) -> Self {
        Self {
            local_store,
            queue,
            remote,
            max_retries: None,
        }
    }

    /// Sets the retry ceiling. `None` retries forever.
    ///
    /// Entries at the ceiling stay queued; they are reported as exhausted
    /// and never deleted.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Drains the current queue snapshot
    ///
    /// # Errors
    /// Returns [`SyncError::QueueUnavailable`] if the queue cannot be read.
    /// Per-entry failures are counted in the result instead.
    #[tracing::instrument(skip(self))]
    pub async fn process_queue(&self) -> Result<SyncResult, SyncError> {
        let start = Instant::now();
        let entries = self
            .queue
            .drain_all()
            .await
            .map_err(|e| SyncError::QueueUnavailable(format!("{e:#}")))?;

        let mut result = SyncResult::default();
        if entries.is_empty() {
            debug!("Mutation queue empty, nothing to sync");
            return Ok(result);
        }

        info!(entries = entries.len(), "Draining mutation queue");

        for entry in &entries {
            if entry.is_waiting_for_insert() {
                debug!(
                    entry_id = %entry.id,
                    collection = %entry.collection,
                    operation = %entry.operation,
                    "Deferring entry until its INSERT is confirmed"
                );
                result.deferred += 1;
                continue;
            }

            if let Some(max) = self.max_retries {
                if entry.retry_count >= max {
                    debug!(
                        entry_id = %entry.id,
                        retry_count = entry.retry_count,
                        max_retries = max,
                        "Skipping exhausted entry"
                    );
                    result.exhausted += 1;
                    continue;
                }
            }

            match self.apply(entry).await {
                Ok(Applied { change, removed }) => {
                    if !removed {
                        if let Err(e) = self.queue.remove(&entry.id).await {
                            // Left in place, the entry would be replayed
                            error!(entry_id = %entry.id, error = %e, "Failed to remove synced entry");
                        }
                    }
                    debug!(
                        entry_id = %entry.id,
                        collection = %change.collection,
                        operation = %change.operation,
                        entity_id = %change.id,
                        "Entry synced"
                    );
                    result.changes.push(change);
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(
                        entry_id = %entry.id,
                        collection = %entry.collection,
                        operation = %entry.operation,
                        retry_count = entry.retry_count + 1,
                        error = %message,
                        "Entry failed, will retry on next drain"
                    );
                    result.failed += 1;
                    if let Err(e) = self.queue.increment_retry(&entry.id, Some(&message)).await {
                        error!(entry_id = %entry.id, error = %e, "Failed to record retry");
                    }
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            synced = result.changes.len(),
            failed = result.failed,
            deferred = result.deferred,
            exhausted = result.exhausted,
            duration_ms = result.duration_ms,
            "Drain complete"
        );
        Ok(result)
    }

    /// Sends one entry to the remote store
    async fn apply(&self, entry: &MutationEntry) -> Result<Applied> {
        let collection = entry.collection;
        match entry.operation {
            Operation::Insert => self.apply_insert(entry).await,
            Operation::Update => {
                let id = entry.entity_id().context("UPDATE entry has no id")?;
                self.remote
                    .update(collection, &id, &entry.payload)
                    .await
                    .context("remote update failed")?;
                Ok(Applied::pending_removal(collection, Operation::Update, id))
            }
            Operation::Delete => {
                let id = entry.entity_id().context("DELETE entry has no id")?;
                self.remote
                    .delete(collection, &id)
                    .await
                    .context("remote delete failed")?;
                Ok(Applied::pending_removal(collection, Operation::Delete, id))
            }
        }
    }

    async fn apply_insert(&self, entry: &MutationEntry) -> Result<Applied> {
        let collection = entry.collection;

        let server = match &entry.confirmed_id {
            Some(permanent) => {
                debug!(
                    entry_id = %entry.id,
                    entity_id = %permanent,
                    "INSERT already accepted remotely, reconciling only"
                );
                let mut server = EntityRecord::new();
                server.set_id(permanent);
                server
            }
            None => {
                let payload = entry.payload.without_temporary_id();
                self.remote
                    .insert(collection, &payload)
                    .await
                    .context("remote insert failed")?
            }
        };
        let permanent = server
            .id()
            .context("remote insert returned a row without id")?;

        let Some(temp_id) = entry.entity_id().filter(RecordId::is_temporary) else {
            return Ok(Applied::pending_removal(collection, Operation::Insert, permanent));
        };

        if let Err(e) = self
            .local_store
            .confirm_insert(collection, &entry.id, &temp_id, &server)
            .await
        {
            error!(
                collection = %collection,
                temp_id = %temp_id,
                entity_id = %permanent,
                error = %e,
                "Failed to reconcile temporary id locally"
            );
            if entry.confirmed_id.is_none() {
                if let Err(mark) = self.queue.mark_confirmed(&entry.id, &permanent).await {
                    // Without the mark the next drain sends the INSERT again
                    error!(entry_id = %entry.id, error = %mark, "Failed to record confirmed id");
                }
            }
            return Err(e.context(format!("inserted remotely as {permanent}, local reconcile failed")));
        }

        Ok(Applied {
            change: SyncedChange {
                collection,
                operation: Operation::Insert,
                id: permanent,
                previous_id: Some(temp_id),
            },
            removed: true,
        })
    }
}

/// A successfully applied entry
struct Applied {
    change: SyncedChange,
    /// The entry already left the queue with the local reconcile
    removed: bool,
}

impl Applied {
    fn pending_removal(collection: Collection, operation: Operation, id: RecordId) -> Self {
        Self {
            change: SyncedChange {
                collection,
                operation,
                id,
                previous_id: None,
            },
            removed: false,
        }
    }
}
