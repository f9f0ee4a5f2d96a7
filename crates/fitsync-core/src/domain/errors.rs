//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! such as unknown collection names, malformed identifiers and
//! records that cannot be interpreted as entity maps.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Collection name is not one of the known collections
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Record identifier is empty or malformed
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),

    /// Tenant identifier is empty or malformed
    #[error("Invalid tenant ID: {0}")]
    InvalidTenantId(String),

    /// Operation name is not INSERT, UPDATE or DELETE
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// A JSON value could not be interpreted as an entity record
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
