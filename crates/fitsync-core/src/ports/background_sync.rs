//! Background sync port
//!
//! Some platforms can wake the application later to finish pending work.
//! This port is optional: when no implementation is wired in, callers skip
//! the registration silently.

/// Port trait for registering a background-sync continuation
#[async_trait::async_trait]
pub trait IBackgroundSync: Send + Sync {
    /// Asks the platform to run a sync later under the given tag
    async fn register(&self, tag: &str) -> anyhow::Result<()>;
}
