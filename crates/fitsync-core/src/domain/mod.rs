//! Domain types
//!
//! This module contains the core types of the offline cache:
//! - Newtypes for record identifiers (permanent and temporary) and tenants
//! - The closed set of cached collections
//! - Entity records (opaque field maps)
//! - Mutation queue entries
//! - Change events published on the notification bus
//! - Domain-specific error types

pub mod change;
pub mod collection;
pub mod errors;
pub mod mutation;
pub mod newtypes;
pub mod record;

// Re-export commonly used types
pub use change::{ChangeEvent, ChangeKind, ChangeSource};
pub use collection::{Collection, MUTATION_QUEUE_COLLECTION};
pub use errors::DomainError;
pub use mutation::{MutationEntry, Operation};
pub use newtypes::{is_temporary_id, RecordId, TenantId, TEMP_ID_PREFIX};
pub use record::EntityRecord;
