//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for record and tenant
//! identifiers. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Prefix carried by every locally generated, provisional identifier
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Length of the random suffix of a temporary identifier
const TEMP_ID_RANDOM_LEN: usize = 9;

// ============================================================================
// RecordId
// ============================================================================

/// Identifier of an entity record within its collection
///
/// Either a permanent identifier assigned by the remote store, or a
/// temporary identifier of the form `temp_<timestamp>_<random>` created
/// locally while the record has not reached the server yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Create a RecordId from an existing identifier string
    ///
    /// # Errors
    /// Returns error if the identifier is empty or only whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidRecordId(
                "Record ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh temporary identifier
    ///
    /// Format: `temp_<unix millis>_<9 lowercase alphanumerics>`.
    #[must_use]
    pub fn temporary() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{TEMP_ID_PREFIX}{}_{}",
            Utc::now().timestamp_millis(),
            &random[..TEMP_ID_RANDOM_LEN]
        ))
    }

    /// Returns true if this is a locally generated provisional identifier
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.0)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returns true if `id` is recognizable as a temporary identifier
#[must_use]
pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ============================================================================
// TenantId
// ============================================================================

/// Identifier of the trainer (tenant) that owns a record
///
/// Supplied by authentication. Every record readable by a tenant carries
/// this value in its `trainer_id` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a TenantId
    ///
    /// # Errors
    /// Returns error if the identifier is empty or only whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidTenantId(
                "Tenant ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}
