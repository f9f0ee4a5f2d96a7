//! Remote store port (driven/secondary port)
//!
//! Generic per-table access to the hosted backend. The sync engine only
//! needs four operations; query and authorization semantics stay on the
//! server side.
//!
//! ## Design Notes
//!
//! - Errors are opaque (`anyhow::Result`): every failure means "this entry
//!   failed" to the sync engine.
//! - `RemoteFilter` only supports equality predicates combined with AND,
//!   which is all the cache ever asks for.

use crate::domain::{Collection, EntityRecord, RecordId};

// ============================================================================
// RemoteFilter
// ============================================================================

/// Equality filter for remote selects
///
/// # Example
///
/// ```
/// use fitsync_core::ports::RemoteFilter;
///
/// let filter = RemoteFilter::new().eq("trainer_id", "trainer-1");
/// assert_eq!(filter.predicates().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFilter {
    predicates: Vec<(String, String)>,
}

impl RemoteFilter {
    /// Creates an empty filter (matches all rows)
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `field = value` predicate
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push((field.into(), value.into()));
        self
    }

    /// Returns the `(field, value)` predicates in insertion order
    pub fn predicates(&self) -> &[(String, String)] {
        &self.predicates
    }

    /// Returns true if no predicates are set
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Returns true if the record satisfies every predicate
    ///
    /// Non-string field values are compared by their JSON rendering.
    pub fn matches(&self, record: &EntityRecord) -> bool {
        self.predicates.iter().all(|(field, value)| {
            match record.get(field) {
                Some(serde_json::Value::String(s)) => s == value,
                Some(other) => other.to_string() == *value,
                None => false,
            }
        })
    }
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port trait for the remote backend
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Returns the rows of a table matching the filter
    async fn select(
        &self,
        collection: Collection,
        filter: &RemoteFilter,
    ) -> anyhow::Result<Vec<EntityRecord>>;

    /// Inserts a row; the server assigns the id and returns the stored row
    async fn insert(
        &self,
        collection: Collection,
        record: &EntityRecord,
    ) -> anyhow::Result<EntityRecord>;

    /// Applies a patch to the row with the given id
    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &EntityRecord,
    ) -> anyhow::Result<()>;

    /// Deletes the row with the given id
    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()>;
}
