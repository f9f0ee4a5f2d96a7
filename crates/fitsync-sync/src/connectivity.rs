//! Verified online/offline state
//!
//! The platform's online flag is necessary but not sufficient evidence of
//! connectivity. [`ConnectivityMonitor`] trusts "offline" events right
//! away but confirms "online" events (and the startup state) with an
//! active reachability probe.
//!
//! The state starts as online so consumers do not flash an offline
//! indicator before the first check completes. Changes are published on a
//! `tokio::sync::watch` channel; the scheduler listens to it to trigger a
//! sync on reconnect.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use fitsync_core::ports::IReachabilityProbe;

/// Online/offline notification from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    Online,
    Offline,
}

/// Tracks whether the remote backend is actually reachable
pub struct ConnectivityMonitor {
    probe: Arc<dyn IReachabilityProbe>,
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn IReachabilityProbe>) -> Self {
        let (state, _) = watch::channel(true);
        Self { probe, state }
    }

    /// Last known state
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver for state changes (online indicator, reconnect triggers)
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Probes reachability and records the result
    ///
    /// Used at startup and whenever the platform claims to be online.
    pub async fn check(&self) -> bool {
        let online = self.probe.probe().await;
        self.set_online(online);
        online
    }

    /// Applies a platform connectivity event
    ///
    /// `Offline` is trusted immediately. `Online` is only accepted if the
    /// reachability probe succeeds. Returns the resulting state.
    pub async fn handle_platform_event(&self, event: PlatformEvent) -> bool {
        debug!(?event, "Platform connectivity event");
        match event {
            PlatformEvent::Offline => {
                self.set_online(false);
                false
            }
            PlatformEvent::Online => self.check().await,
        }
    }

    fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }
}
