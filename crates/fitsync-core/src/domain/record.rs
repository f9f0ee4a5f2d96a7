//! Entity records
//!
//! An [`EntityRecord`] is an opaque mapping of field name to JSON value.
//! The cache only interprets three fields:
//!
//! | Field        | Meaning                                              |
//! |--------------|------------------------------------------------------|
//! | `id`         | Permanent or temporary record identifier             |
//! | `trainer_id` | Owning tenant, used for isolation and offline reads  |
//! | `created_at` | ISO-8601 creation timestamp, defaulted on first write |
//!
//! Everything else is carried through untouched.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::newtypes::{RecordId, TenantId};

pub const ID_FIELD: &str = "id";
pub const TRAINER_ID_FIELD: &str = "trainer_id";
pub const CREATED_AT_FIELD: &str = "created_at";

/// A single cached entity, stored as a JSON object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord(Map<String, Value>);

impl EntityRecord {
    /// Creates an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets a JSON value as a record
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRecord` unless the value is a JSON object
    pub fn from_value(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DomainError::InvalidRecord(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Converts the record back into a JSON value
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Borrows the underlying field map
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the value of a field, if present
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field, returning the previous value
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Removes a field, returning its value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Builder-style field setter
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Overwrites this record's fields with every field of `other`
    pub fn merge(&mut self, other: &EntityRecord) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    // --- id ---

    /// Returns the record identifier
    ///
    /// String ids are used as-is; numeric ids (some remote tables use
    /// integer keys) are rendered to their decimal form.
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) => RecordId::new(s.clone()).ok(),
            Value::Number(n) => RecordId::new(n.to_string()).ok(),
            _ => None,
        }
    }

    /// Returns true if the record carries a temporary identifier
    #[must_use]
    pub fn has_temporary_id(&self) -> bool {
        self.id().is_some_and(|id| id.is_temporary())
    }

    pub fn set_id(&mut self, id: &RecordId) {
        self.0
            .insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
    }

    /// Returns a copy with the `id` field removed if it is temporary
    ///
    /// Used before sending an INSERT: the remote store assigns the
    /// permanent identifier.
    #[must_use]
    pub fn without_temporary_id(&self) -> Self {
        let mut copy = self.clone();
        if copy.has_temporary_id() {
            copy.0.remove(ID_FIELD);
        }
        copy
    }

    // --- trainer_id ---

    #[must_use]
    pub fn trainer_id(&self) -> Option<TenantId> {
        match self.0.get(TRAINER_ID_FIELD)? {
            Value::String(s) => TenantId::new(s.clone()).ok(),
            _ => None,
        }
    }

    pub fn set_trainer_id(&mut self, tenant: &TenantId) {
        self.0.insert(
            TRAINER_ID_FIELD.to_string(),
            Value::String(tenant.as_str().to_string()),
        );
    }

    // --- created_at ---

    #[must_use]
    pub fn created_at(&self) -> Option<&str> {
        self.0.get(CREATED_AT_FIELD).and_then(Value::as_str)
    }

    /// Sets `created_at` to the current time unless already present
    pub fn ensure_created_at(&mut self) {
        if self.created_at().is_none() {
            self.0.insert(
                CREATED_AT_FIELD.to_string(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
    }
}

impl From<Map<String, Value>> for EntityRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for EntityRecord {
    type Error = DomainError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
