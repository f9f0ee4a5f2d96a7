//! Sync scheduler - decides when the queue is drained
//!
//! Every sync trigger (startup, verified reconnect, periodic timer, user
//! action, platform background-sync callback) goes through one channel and
//! one [`Debouncer`], so near-simultaneous sources collapse into at most
//! one drain per cooldown window.
//!
//! ## Flow
//!
//! ```text
//! SyncHandle::request ──→ mpsc ──┐
//! periodic timer (online) ───────┼──→ Debouncer ──→ try_sync ──→ SyncEngine
//! ConnectivityMonitor (watch) ───┘                     │
//!                                               is_syncing guard
//! ```
//!
//! ## Drain Guard
//!
//! Only one drain runs at a time. A trigger arriving while a drain is in
//! flight is rejected with [`SyncAttempt::Busy`], never queued behind it.
//! The in-process flag is backed by a lease on the queue, so a second
//! process sharing the cache (the CLI next to the daemon) is turned away
//! the same way. A lease left by a crashed process lapses after
//! [`DRAIN_LEASE_TTL`].
//! There is no mid-drain cancellation: shutdown waits for the running
//! drain to finish its snapshot.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fitsync_core::config::SyncConfig;
use fitsync_core::domain::{ChangeEvent, ChangeSource};
use fitsync_core::ports::{IBackgroundSync, IMutationQueue};

use crate::bus::ChangeBus;
use crate::connectivity::ConnectivityMonitor;
use crate::engine::{SyncEngine, SyncResult};

/// Tag used when registering a background-sync continuation
pub const BACKGROUND_SYNC_TAG: &str = "fitsync-sync";

/// How long a drain lease stays valid without being released
pub const DRAIN_LEASE_TTL: Duration = Duration::from_secs(300);

/// Capacity of the trigger channel
const TRIGGER_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Triggers and results
// ============================================================================

/// Reason a drain was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    /// Verified transition from offline to online
    Reconnect,
    Periodic,
    /// Explicit user action
    Manual,
    /// Platform background-sync callback
    BackgroundSync,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Reconnect => "reconnect",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::Manual => "manual",
            SyncTrigger::BackgroundSync => "background_sync",
        };
        f.write_str(name)
    }
}

/// Outcome of one sync attempt
#[derive(Debug, Clone)]
pub enum SyncAttempt {
    /// The drain ran over the full snapshot
    Completed(SyncResult),
    /// Another drain was in flight; try later
    Busy,
    /// Not attempted because the client is offline
    Offline,
    /// The queue could not be read
    Failed(String),
}

/// Snapshot for online indicators and status commands
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Queued entries, if the queue could be read
    pub pending: Option<usize>,
}

// ============================================================================
// Debouncer
// ============================================================================

/// Collapses triggers that fire within a cooldown window
///
/// The first trigger is accepted and opens the window; every trigger
/// inside the window is dropped.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if a trigger arriving now should run
    pub fn accept(&mut self) -> bool {
        self.accept_at(Instant::now())
    }

    /// Same as [`accept`](Debouncer::accept) with an explicit clock reading
    pub fn accept_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct Shared {
    engine: Arc<SyncEngine>,
    connectivity: Arc<ConnectivityMonitor>,
    bus: Arc<ChangeBus>,
    queue: Arc<dyn IMutationQueue>,
    background: OnceLock<Arc<dyn IBackgroundSync>>,
    /// Lease owner name of this scheduler
    lease_owner: String,
    is_syncing: AtomicBool,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
}

/// Clears the drain guard when the drain ends, including on panic
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    async fn try_sync(&self, trigger: SyncTrigger) -> SyncAttempt {
        if !self.connectivity.is_online() {
            debug!(%trigger, "Offline, sync not attempted");
            return SyncAttempt::Offline;
        }

        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%trigger, "Drain already in flight, trigger rejected");
            return SyncAttempt::Busy;
        }
        let _guard = SyncingGuard(&self.is_syncing);

        match self.queue.try_claim_drain(&self.lease_owner, DRAIN_LEASE_TTL).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(%trigger, "Drain lease held by another process, trigger rejected");
                return SyncAttempt::Busy;
            }
            Err(e) => {
                error!(%trigger, error = %e, "Could not claim drain lease");
                return SyncAttempt::Failed(format!("{e:#}"));
            }
        }

        let attempt = self.drain(trigger).await;
        if let Err(e) = self.queue.release_drain(&self.lease_owner).await {
            warn!(error = %e, "Could not release drain lease; it lapses on its own");
        }
        attempt
    }

    async fn drain(&self, trigger: SyncTrigger) -> SyncAttempt {
        info!(%trigger, "Starting sync");
        match self.engine.process_queue().await {
            Ok(result) => {
                for change in &result.changes {
                    self.bus.publish(&ChangeEvent::new(
                        change.collection,
                        change.operation.into(),
                        Some(change.id.to_string()),
                        ChangeSource::Sync,
                    ));
                }
                *self.last_sync_time.write().await = Some(Utc::now());

                if !result.is_empty() {
                    if let Some(background) = self.background.get() {
                        if let Err(e) = background.register(BACKGROUND_SYNC_TAG).await {
                            debug!(error = %e, "Background sync registration unavailable");
                        }
                    }
                }
                SyncAttempt::Completed(result)
            }
            Err(e) => {
                error!(%trigger, error = %e, "Sync failed");
                SyncAttempt::Failed(e.to_string())
            }
        }
    }

    async fn status(&self) -> SyncStatus {
        let pending = match self.queue.len().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "Could not read mutation queue length");
                None
            }
        };
        SyncStatus {
            is_online: self.connectivity.is_online(),
            is_syncing: self.is_syncing.load(Ordering::Acquire),
            last_sync_time: *self.last_sync_time.read().await,
            pending,
        }
    }
}

// ============================================================================
// SyncHandle
// ============================================================================

/// Cloneable handle for requesting syncs and reading status
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncTrigger>,
    shared: Arc<Shared>,
}

impl SyncHandle {
    /// Sends a trigger to the scheduler loop (debounced there)
    ///
    /// Returns false if the trigger could not be delivered.
    pub fn request(&self, trigger: SyncTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(%trigger, "Trigger channel full, dropping trigger");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%trigger, "Scheduler stopped, dropping trigger");
                false
            }
        }
    }

    /// Runs a drain now, outside the debounce window
    ///
    /// The drain guard and the offline check still apply.
    pub async fn try_sync(&self, trigger: SyncTrigger) -> SyncAttempt {
        self.shared.try_sync(trigger).await
    }

    pub async fn status(&self) -> SyncStatus {
        self.shared.status().await
    }
}

// ============================================================================
// SyncScheduler
// ============================================================================

/// Owns the trigger channel and runs the scheduling loop
pub struct SyncScheduler {
    rx: mpsc::Receiver<SyncTrigger>,
    tx: mpsc::Sender<SyncTrigger>,
    shared: Arc<Shared>,
    debouncer: Debouncer,
    periodic_interval: Duration,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        connectivity: Arc<ConnectivityMonitor>,
        bus: Arc<ChangeBus>,
        queue: Arc<dyn IMutationQueue>,
        config: &SyncConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);

        info!(
            periodic_secs = config.periodic_interval_secs,
            debounce_secs = config.debounce_secs,
            "Creating sync scheduler"
        );

        Self {
            rx,
            tx,
            shared: Arc::new(Shared {
                engine,
                connectivity,
                bus,
                queue,
                background: OnceLock::new(),
                lease_owner: format!("fitsync-{}-{}", std::process::id(), Uuid::new_v4().simple()),
                is_syncing: AtomicBool::new(false),
                last_sync_time: RwLock::new(None),
            }),
            debouncer: Debouncer::new(config.debounce()),
            periodic_interval: config.periodic_interval(),
        }
    }

    /// Registers a continuation with the platform after successful drains
    pub fn with_background_sync(self, background: Arc<dyn IBackgroundSync>) -> Self {
        if self.shared.background.set(background).is_err() {
            warn!("Background sync already configured");
        }
        self
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Main loop, until `shutdown` is cancelled
    ///
    /// Reacts to explicit triggers, the periodic timer (only while online)
    /// and offline-to-online transitions of the connectivity monitor.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Sync scheduler starting");

        let mut online_rx = self.shared.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();

        let mut periodic = tokio::time::interval_at(
            Instant::now() + self.periodic_interval,
            self.periodic_interval,
        );
        periodic.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Vec<JoinHandle<SyncAttempt>> = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, scheduler stopping");
                    break;
                }

                Some(trigger) = self.rx.recv() => {
                    self.dispatch(trigger, &mut in_flight);
                }

                _ = periodic.tick() => {
                    if self.shared.connectivity.is_online() {
                        self.dispatch(SyncTrigger::Periodic, &mut in_flight);
                    }
                }

                Ok(()) = online_rx.changed() => {
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        self.dispatch(SyncTrigger::Reconnect, &mut in_flight);
                    }
                    was_online = online;
                }
            }
        }

        for handle in in_flight {
            if !handle.is_finished() {
                info!("Waiting for in-flight drain to finish");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Drain task failed");
            }
        }

        info!("Sync scheduler stopped");
    }

    fn dispatch(&mut self, trigger: SyncTrigger, in_flight: &mut Vec<JoinHandle<SyncAttempt>>) {
        if !self.debouncer.accept() {
            debug!(%trigger, "Trigger debounced");
            return;
        }

        in_flight.retain(|handle| !handle.is_finished());
        let shared = self.shared.clone();
        in_flight.push(tokio::spawn(
            async move { shared.try_sync(trigger).await },
        ));
    }
}
