//! Change notification bus
//!
//! An explicitly constructed, in-process publish/subscribe dispatcher that
//! tells data consumers when a collection changed, without polling.
//!
//! ## Delivery Rules
//!
//! - Subscribers register per collection, or globally with `None`.
//! - `publish` runs synchronously: per-collection subscribers first, then
//!   global ones, each in registration order.
//! - Registering the same callback twice for the same topic is a no-op.
//! - A subscriber that fails or panics is logged and skipped; the rest
//!   still receive the event.
//!
//! ## Cross-Context Relay
//!
//! Several buses (e.g. one per open window or process-local service) can
//! share a [`CrossContextChannel`]. Every locally published event is
//! broadcast on it; [`ChangeBus::attach_relay`] re-publishes events that
//! came from other contexts locally, without broadcasting them again.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use fitsync_core::domain::{ChangeEvent, ChangeSource, Collection};

/// Subscriber callback
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync>;

/// Map key of global subscribers
const GLOBAL_TOPIC: &str = "";

fn topic_key(topic: Option<Collection>) -> &'static str {
    topic.map_or(GLOBAL_TOPIC, |c| c.as_str())
}

// ============================================================================
// Cross-context channel
// ============================================================================

/// Event tagged with the context that published it
#[derive(Debug, Clone)]
pub struct RelayEnvelope {
    pub origin: String,
    pub event: ChangeEvent,
}

/// Shared message channel between execution contexts
#[derive(Debug, Clone)]
pub struct CrossContextChannel {
    tx: broadcast::Sender<RelayEnvelope>,
}

impl CrossContextChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle returned by [`ChangeBus::subscribe`]
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    bus: Weak<ChangeBus>,
    key: &'static str,
    callback: ChangeCallback,
}

impl Subscription {
    /// Removes the callback from the bus
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.key, &self.callback);
        }
    }
}

// ============================================================================
// ChangeBus
// ============================================================================

/// In-process change dispatcher
pub struct ChangeBus {
    subscribers: DashMap<&'static str, Vec<ChangeCallback>>,
    context_id: String,
    channel: Option<CrossContextChannel>,
}

impl ChangeBus {
    /// Creates a bus without cross-context propagation
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: DashMap::new(),
            context_id: Uuid::new_v4().to_string(),
            channel: None,
        })
    }

    /// Creates a bus that broadcasts on a shared channel
    pub fn with_channel(channel: CrossContextChannel) -> Arc<Self> {
        Arc::new(Self {
            subscribers: DashMap::new(),
            context_id: Uuid::new_v4().to_string(),
            channel: Some(channel),
        })
    }

    /// Identifier of this context on the shared channel
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Registers a callback for one collection, or globally with `None`
    pub fn subscribe(
        self: &Arc<Self>,
        topic: Option<Collection>,
        callback: ChangeCallback,
    ) -> Subscription {
        let key = topic_key(topic);
        {
            let mut list = self.subscribers.entry(key).or_default();
            if list.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
                debug!(topic = key, "Callback already subscribed");
            } else {
                list.push(callback.clone());
            }
        }
        Subscription {
            bus: Arc::downgrade(self),
            key,
            callback,
        }
    }

    /// Number of callbacks registered for a topic
    pub fn subscriber_count(&self, topic: Option<Collection>) -> usize {
        self.subscribers
            .get(topic_key(topic))
            .map_or(0, |list| list.len())
    }

    fn remove(&self, key: &'static str, callback: &ChangeCallback) {
        if let Some(mut list) = self.subscribers.get_mut(key) {
            list.retain(|existing| !Arc::ptr_eq(existing, callback));
        }
    }

    /// Delivers an event locally and to other contexts
    ///
    /// Returns the number of local subscribers that handled it successfully.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let delivered = self.deliver(event);

        if let Some(channel) = &self.channel {
            if event.source != ChangeSource::CrossContext {
                // No receivers is fine: no other context is open
                let _ = channel.tx.send(RelayEnvelope {
                    origin: self.context_id.clone(),
                    event: event.clone(),
                });
            }
        }
        delivered
    }

    fn deliver(&self, event: &ChangeEvent) -> usize {
        // Snapshot the callbacks so subscribers may (un)subscribe re-entrantly
        let mut callbacks: Vec<ChangeCallback> = self
            .subscribers
            .get(event.collection.as_str())
            .map(|list| list.clone())
            .unwrap_or_default();
        if let Some(global) = self.subscribers.get(GLOBAL_TOPIC) {
            callbacks.extend(global.iter().cloned());
        }

        let mut delivered = 0;
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    collection = %event.collection,
                    error = %e,
                    "Change subscriber failed"
                ),
                Err(_) => error!(collection = %event.collection, "Change subscriber panicked"),
            }
        }
        delivered
    }

    /// Starts re-publishing events from other contexts
    ///
    /// Returns `None` if the bus has no shared channel. The task ends when
    /// the bus is dropped or the channel closes.
    pub fn attach_relay(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.channel.as_ref()?.tx.subscribe();
        let bus = Arc::downgrade(self);
        let own_id = self.context_id.clone();

        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.origin == own_id {
                            continue;
                        }
                        let Some(bus) = bus.upgrade() else { break };
                        debug!(
                            origin = %envelope.origin,
                            collection = %envelope.event.collection,
                            "Relaying change from another context"
                        );
                        bus.deliver(&envelope.event.relayed());
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Cross-context relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use fitsync_core::domain::{ChangeKind, Operation};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let cb: ChangeCallback = Arc::new(move |_: &ChangeEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, cb)
    }

    fn event(collection: Collection) -> ChangeEvent {
        ChangeEvent::local(collection, Operation::Insert, "c-1")
    }

    #[test]
    fn test_collection_and_global_subscribers() {
        let bus = ChangeBus::new();
        let (clients, cb_clients) = counter();
        let (global, cb_global) = counter();
        bus.subscribe(Some(Collection::Clients), cb_clients);
        bus.subscribe(None, cb_global);

        assert_eq!(bus.publish(&event(Collection::Clients)), 2);
        assert_eq!(bus.publish(&event(Collection::Workouts)), 1);

        assert_eq!(clients.load(Ordering::SeqCst), 1);
        assert_eq!(global.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_collection_subscribers_run_before_global() {
        let bus = ChangeBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        bus.subscribe(
            None,
            Arc::new(move |_: &ChangeEvent| {
                o.lock().unwrap().push("global");
                Ok(())
            }),
        );
        let o = order.clone();
        bus.subscribe(
            Some(Collection::Clients),
            Arc::new(move |_: &ChangeEvent| {
                o.lock().unwrap().push("clients");
                Ok(())
            }),
        );

        bus.publish(&event(Collection::Clients));
        assert_eq!(*order.lock().unwrap(), vec!["clients", "global"]);
    }

    #[test]
    fn test_duplicate_subscription_is_noop() {
        let bus = ChangeBus::new();
        let (count, cb) = counter();
        bus.subscribe(Some(Collection::Clients), cb.clone());
        bus.subscribe(Some(Collection::Clients), cb);

        assert_eq!(bus.subscriber_count(Some(Collection::Clients)), 1);
        bus.publish(&event(Collection::Clients));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = ChangeBus::new();
        let (count, cb) = counter();
        let sub = bus.subscribe(Some(Collection::Clients), cb);
        sub.unsubscribe();

        assert_eq!(bus.publish(&event(Collection::Clients)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_subscribers_do_not_block_others() {
        let bus = ChangeBus::new();
        bus.subscribe(
            Some(Collection::Clients),
            Arc::new(|_: &ChangeEvent| Err(anyhow::anyhow!("render failed"))),
        );
        bus.subscribe(
            Some(Collection::Clients),
            Arc::new(|_: &ChangeEvent| -> anyhow::Result<()> { panic!("boom") }),
        );
        let (count, cb) = counter();
        bus.subscribe(None, cb);

        assert_eq!(bus.publish(&event(Collection::Clients)), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_during_publish() {
        let bus = ChangeBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let s = slot.clone();
        let sub = bus.subscribe(
            Some(Collection::Clients),
            Arc::new(move |_: &ChangeEvent| {
                if let Some(sub) = s.lock().unwrap().take() {
                    sub.unsubscribe();
                }
                Ok(())
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(bus.publish(&event(Collection::Clients)), 1);
        assert_eq!(bus.subscriber_count(Some(Collection::Clients)), 0);
    }

    #[tokio::test]
    async fn test_relay_between_contexts() {
        let channel = CrossContextChannel::new(16);
        let a = ChangeBus::with_channel(channel.clone());
        let b = ChangeBus::with_channel(channel);
        a.attach_relay().unwrap();
        b.attach_relay().unwrap();

        let (a_count, a_cb) = counter();
        a.subscribe(None, a_cb);
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        b.subscribe(
            Some(Collection::Clients),
            Arc::new(move |e: &ChangeEvent| {
                r.lock().unwrap().push(e.clone());
                Ok(())
            }),
        );

        a.publish(&ChangeEvent::refresh(Collection::Clients));

        tokio::time::timeout(Duration::from_secs(2), async {
            while received.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay delivered");

        let got = received.lock().unwrap().clone();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, ChangeKind::Refresh);
        assert_eq!(got[0].source, ChangeSource::CrossContext);
        // The origin did not receive its own event twice
        assert_eq!(a_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_relay_without_channel() {
        let bus = ChangeBus::new();
        assert!(bus.attach_relay().is_none());
    }
}
