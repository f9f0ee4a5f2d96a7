//! Mutation queue entries
//!
//! A [`MutationEntry`] records one pending local write that still has to be
//! replayed against the remote store. Entries are created on every local
//! mutation (unless the write is local-only) and removed exactly once, after
//! the remote store confirmed the change.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::collection::Collection;
use super::errors::DomainError;
use super::newtypes::RecordId;
use super::record::EntityRecord;

/// Kind of write captured by a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

/// One pending outbound write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEntry {
    /// Derived from `(collection, entity id, enqueue timestamp)`
    pub id: String,
    pub collection: Collection,
    pub operation: Operation,
    /// Record at mutation time; for DELETE, the record captured before removal
    pub payload: EntityRecord,
    pub enqueued_at: DateTime<Utc>,
    /// Failed sync attempts so far
    pub retry_count: u32,
    /// Message of the most recent failure, if any
    pub last_error: Option<String>,
    /// Permanent id of an INSERT the remote store already accepted but whose
    /// local id replacement has not been committed yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_id: Option<RecordId>,
}

impl MutationEntry {
    /// Creates a new entry stamped with the current time
    #[must_use]
    pub fn new(collection: Collection, operation: Operation, payload: EntityRecord) -> Self {
        Self::new_at(collection, operation, payload, Utc::now())
    }

    /// Creates a new entry with an explicit enqueue timestamp
    #[must_use]
    pub fn new_at(
        collection: Collection,
        operation: Operation,
        payload: EntityRecord,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        let id = Self::derive_id(collection, payload.id().as_ref(), enqueued_at);
        Self {
            id,
            collection,
            operation,
            payload,
            enqueued_at,
            retry_count: 0,
            last_error: None,
            confirmed_id: None,
        }
    }

    /// Deterministic entry id for `(collection, entity, timestamp)`
    ///
    /// Microsecond resolution keeps back-to-back writes to the same entity
    /// from colliding.
    #[must_use]
    pub fn derive_id(
        collection: Collection,
        entity_id: Option<&RecordId>,
        enqueued_at: DateTime<Utc>,
    ) -> String {
        let entity = entity_id.map_or("unknown", RecordId::as_str);
        format!(
            "{}_{}_{}",
            collection.as_str(),
            entity,
            enqueued_at.timestamp_micros()
        )
    }

    /// Identifier of the entity this entry targets
    #[must_use]
    pub fn entity_id(&self) -> Option<RecordId> {
        self.payload.id()
    }

    /// True for UPDATE/DELETE entries that still reference a temporary id
    ///
    /// Such entries must wait until the INSERT of the same entity has been
    /// confirmed and the id rewritten.
    #[must_use]
    pub fn is_waiting_for_insert(&self) -> bool {
        self.operation != Operation::Insert && self.payload.has_temporary_id()
    }
}
