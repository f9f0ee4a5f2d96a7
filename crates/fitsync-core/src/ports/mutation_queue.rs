//! Mutation queue port (driven/secondary port)
//!
//! Durable, insertion-ordered log of pending outbound writes.
//!
//! ## Design Notes
//!
//! - `drain_all` is a read-only snapshot; entries leave the queue only
//!   through `remove`, after the remote store confirmed them.
//! - Failures never delete: `increment_retry` bumps the counter and keeps
//!   the entry.
//! - The drain lease is shared by every process using the same queue, so
//!   the daemon and a CLI `sync` never replay the same snapshot twice.

use std::time::Duration;

use crate::domain::{Collection, MutationEntry, RecordId};

/// Port trait for the mutation queue
#[async_trait::async_trait]
pub trait IMutationQueue: Send + Sync {
    /// Appends an entry
    async fn enqueue(&self, entry: &MutationEntry) -> anyhow::Result<()>;

    /// Returns every queued entry in stored order without removing any
    async fn drain_all(&self) -> anyhow::Result<Vec<MutationEntry>>;

    /// Deletes one entry after confirmed remote application
    async fn remove(&self, entry_id: &str) -> anyhow::Result<()>;

    /// Increments an entry's retry count and records the failure message
    async fn increment_retry(&self, entry_id: &str, error: Option<&str>) -> anyhow::Result<()>;

    /// Rewrites the payload id of queued entries for one entity
    ///
    /// Called after a temporary id was replaced by a permanent one, so
    /// deferred UPDATE/DELETE entries become sendable. Returns the number
    /// of entries rewritten.
    async fn rewrite_entity_id(
        &self,
        collection: Collection,
        old_id: &RecordId,
        new_id: &RecordId,
    ) -> anyhow::Result<u64>;

    /// Records that the remote store accepted an INSERT under `permanent`
    ///
    /// Later drains reconcile the entry locally without sending it again.
    async fn mark_confirmed(&self, entry_id: &str, permanent: &RecordId) -> anyhow::Result<()>;

    /// Number of queued entries
    async fn len(&self) -> anyhow::Result<usize>;

    /// Claims the drain lease for `owner` for `ttl`
    ///
    /// Returns false while another owner holds an unexpired lease. The
    /// current owner may claim again to extend its lease.
    async fn try_claim_drain(&self, owner: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Releases the lease if `owner` holds it
    async fn release_drain(&self, owner: &str) -> anyhow::Result<()>;
}
