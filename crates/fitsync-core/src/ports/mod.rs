//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! offline cache. The core depends on these interfaces; implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - Durable per-tenant entity storage
//! - [`IMutationQueue`] - Ordered log of pending outbound writes
//! - [`IRemoteStore`] - Generic per-table remote backend
//! - [`IReachabilityProbe`] - Active network reachability check
//! - [`IBackgroundSync`] - Optional platform background-sync registration

pub mod background_sync;
pub mod local_store;
pub mod mutation_queue;
pub mod reachability;
pub mod remote_store;

pub use background_sync::IBackgroundSync;
pub use local_store::{CommittedWrite, ILocalStore};
pub use mutation_queue::IMutationQueue;
pub use reachability::IReachabilityProbe;
pub use remote_store::{IRemoteStore, RemoteFilter};
