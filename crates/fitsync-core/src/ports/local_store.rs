//! Local store port (driven/secondary port)
//!
//! This module defines the interface for the durable, per-tenant entity
//! cache that every read and optimistic write goes through.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   the core only distinguishes "worked" from "storage unavailable".
//! - Absence is not an error: lookups return `Option`, deletes of missing
//!   records succeed.
//! - Each operation is atomic on its own. `put` followed by an enqueue on
//!   the mutation queue is NOT atomic; `commit_with_mutation` is the opt-in
//!   single-transaction variant.
//! - `confirm_insert` moves a record to its server id, rewrites its queued
//!   entries and removes the confirmed INSERT in one transaction.

use crate::domain::{Collection, EntityRecord, MutationEntry, Operation, RecordId, TenantId};

/// Result of an atomic entity write + enqueue
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedWrite {
    /// Record as stored (after id / `created_at` / `trainer_id` defaulting)
    pub record: EntityRecord,
    /// Queue entry written in the same transaction
    pub entry: MutationEntry,
}

/// Port trait for the local entity store
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    /// Ensures every collection and secondary index exists
    ///
    /// Idempotent and safe to call concurrently: the first caller sets up
    /// the schema, later callers return immediately. An error here means
    /// durable storage is unavailable and is fatal to the caller.
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Returns every record of a collection, optionally for one tenant only
    async fn get_all(
        &self,
        collection: Collection,
        tenant: Option<&TenantId>,
    ) -> anyhow::Result<Vec<EntityRecord>>;

    /// Returns one record, or `None` if it does not exist
    async fn get_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> anyhow::Result<Option<EntityRecord>>;

    /// Upserts a record by its `id`
    ///
    /// Records without an id get a temporary one. Missing `created_at` is
    /// set to now and missing `trainer_id` falls back to the cached tenant.
    /// Returns the record exactly as stored.
    async fn put(&self, collection: Collection, record: EntityRecord)
        -> anyhow::Result<EntityRecord>;

    /// Removes a record; succeeds if it is already absent
    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()>;

    /// Writes the entity change and its queue entry in one transaction
    ///
    /// For `Operation::Delete`, `record` is the record captured before
    /// removal; it is deleted by id and becomes the entry payload.
    async fn commit_with_mutation(
        &self,
        collection: Collection,
        operation: Operation,
        record: EntityRecord,
    ) -> anyhow::Result<CommittedWrite>;

    /// Replaces a temporary id after the remote store accepted the INSERT
    ///
    /// `server` is the row returned by the remote store and carries the
    /// permanent id. If the temporary record still exists it is moved to
    /// that id, with local fields winning over server fields. Queued entries
    /// for the entity are rewritten to the permanent id and the INSERT entry
    /// `entry_id` is removed. Either all of this happens or none of it.
    /// Returns the number of queued entries rewritten.
    async fn confirm_insert(
        &self,
        collection: Collection,
        entry_id: &str,
        temp_id: &RecordId,
        server: &EntityRecord,
    ) -> anyhow::Result<u64>;

    /// Remembers the authenticated tenant for `trainer_id` fallback
    async fn set_cached_tenant(&self, tenant: &TenantId) -> anyhow::Result<()>;

    /// Returns the last remembered tenant, if any
    async fn cached_tenant(&self) -> anyhow::Result<Option<TenantId>>;
}
