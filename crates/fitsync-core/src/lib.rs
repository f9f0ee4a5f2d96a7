//! fitsync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal core of the offline-first cache:
//! - **Domain types** - `EntityRecord`, `RecordId`, `TenantId`, `Collection`,
//!   `MutationEntry`, `ChangeEvent`
//! - **Port definitions** - Traits implemented by adapter crates:
//!   `ILocalStore`, `IMutationQueue`, `IRemoteStore`, `IReachabilityProbe`,
//!   `IBackgroundSync`
//! - **Configuration** - Typed YAML configuration with validation
//!
//! # Architecture
//!
//! The domain module is pure data with no I/O. Ports define the trait
//! interfaces that the cache (SQLite) and remote (HTTP) crates implement,
//! and that the sync crate orchestrates.

pub mod config;
pub mod domain;
pub mod ports;
