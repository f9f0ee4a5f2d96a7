//! Reachability probe port
//!
//! The platform's online flag is necessary but not sufficient evidence of
//! connectivity. A probe makes a lightweight request to an always-available
//! resource and reports whether it answered in time.

/// Port trait for active reachability checks
#[async_trait::async_trait]
pub trait IReachabilityProbe: Send + Sync {
    /// Returns true if the network is actually usable
    ///
    /// Timeouts and request errors report `false`; implementations never
    /// fail.
    async fn probe(&self) -> bool;
}
