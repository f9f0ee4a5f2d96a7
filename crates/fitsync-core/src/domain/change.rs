//! Change events
//!
//! A [`ChangeEvent`] tells data consumers that a collection changed, either
//! through a committed local write, a sync drain or a remote refresh.

use serde::{Deserialize, Serialize};

use super::collection::Collection;
use super::mutation::Operation;

/// What happened to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Collection contents were replaced from the remote store
    Refresh,
}

impl From<Operation> for ChangeKind {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Insert => ChangeKind::Insert,
            Operation::Update => ChangeKind::Update,
            Operation::Delete => ChangeKind::Delete,
        }
    }
}

/// Where the change originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Optimistic write in this process
    Local,
    /// Confirmed by a sync drain
    Sync,
    /// Pulled from the remote store
    Remote,
    /// Relayed from another execution context
    CrossContext,
}

/// Notification that a collection changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    /// Affected record id, if the change concerns a single record
    pub id: Option<String>,
    pub source: ChangeSource,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(
        collection: Collection,
        kind: ChangeKind,
        id: Option<String>,
        source: ChangeSource,
    ) -> Self {
        Self {
            collection,
            kind,
            id,
            source,
        }
    }

    /// Event for a committed local write
    #[must_use]
    pub fn local(collection: Collection, operation: Operation, id: impl Into<String>) -> Self {
        Self::new(
            collection,
            operation.into(),
            Some(id.into()),
            ChangeSource::Local,
        )
    }

    /// Event for a whole-collection refresh
    #[must_use]
    pub fn refresh(collection: Collection) -> Self {
        Self::new(collection, ChangeKind::Refresh, None, ChangeSource::Remote)
    }

    /// Same event, marked as relayed from another context
    #[must_use]
    pub fn relayed(&self) -> Self {
        Self {
            source: ChangeSource::CrossContext,
            ..self.clone()
        }
    }
}
