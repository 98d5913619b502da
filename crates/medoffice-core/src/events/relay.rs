//! Hand-off relay: the in-process bus queue views subscribe to.
//!
//! `emit` builds a `HandoffEvent` and runs every matching listener inline,
//! in registration order. Each listener runs with:
//! - Error isolation (errors are logged, never returned to the emitter)
//! - Panic recovery
//! - A liveness check right before the call, so unsubscribing wins over an
//!   emission that is already iterating
//!
//! The listener set is a copy-on-write snapshot. Dispatch holds no lock, so a
//! listener may subscribe, unsubscribe or emit from inside its callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use super::listeners::{FnListener, HandoffListener, StageListener};
use super::types::{HandoffEvent, Stage};

/// Default buffer size for async bridges created from this configuration.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

/// Relay settings, loaded as the `[relay]` section of the application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// When false the relay is detached: emit and subscribe are no-ops.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Buffer size for `HandoffBroadcaster` bridges.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_broadcast_capacity() -> usize {
    DEFAULT_BROADCAST_CAPACITY
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.broadcast_capacity == 0 {
            return Err("relay.broadcast_capacity must be > 0".into());
        }
        Ok(())
    }
}

// ============================================================================
// Relay
// ============================================================================

struct Registration {
    id: u64,
    listener: Arc<dyn HandoffListener>,
    active: AtomicBool,
}

impl Registration {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

struct RelayInner {
    listeners: ArcSwap<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl RelayInner {
    fn remove(&self, id: u64) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

/// In-process publish/subscribe relay for visit hand-offs.
///
/// Cheap to clone; clones share one listener set. Owned by the application
/// context and handed to queue views, never reached through a global.
///
/// # Example
///
/// ```
/// use medoffice_core::events::{HandoffRelay, Stage};
/// use std::sync::{Arc, Mutex};
///
/// let relay = HandoffRelay::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = seen.clone();
/// let subscription = relay.subscribe(move |event| {
///     sink.lock().unwrap().push(event.visit_id.clone());
/// });
///
/// relay.emit("visit-123", Stage::Nurse, Stage::Doctor);
/// drop(subscription);
/// relay.emit("visit-456", Stage::Doctor, Stage::Lab);
///
/// assert_eq!(*seen.lock().unwrap(), vec!["visit-123".to_string()]);
/// ```
#[derive(Clone)]
pub struct HandoffRelay {
    /// `None` for a detached relay with no dispatch capability.
    inner: Option<Arc<RelayInner>>,
}

impl HandoffRelay {
    /// Create a relay that dispatches to its listeners.
    pub fn new() -> Self {
        Self {
            inner: Some(Arc::new(RelayInner {
                listeners: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(1),
            })),
        }
    }

    /// Create a relay without dispatch capability.
    ///
    /// Stands in for non-interactive contexts: every operation is a silent no-op.
    pub fn detached() -> Self {
        Self { inner: None }
    }

    /// Create a relay from configuration.
    pub fn from_config(config: &RelayConfig) -> Self {
        if config.enabled {
            Self::new()
        } else {
            debug!("Hand-off relay disabled, running detached");
            Self::detached()
        }
    }

    /// Whether this relay can dispatch events.
    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    /// Signal that a visit moved from one stage's queue to another's.
    ///
    /// Returns the number of listeners invoked, for diagnostics only.
    /// Returns 0 for a detached relay or a malformed event.
    pub fn emit(&self, visit_id: impl Into<String>, from_stage: Stage, to_stage: Stage) -> usize {
        if self.inner.is_none() {
            trace!("Hand-off relay detached, emit ignored");
            return 0;
        }
        self.dispatch(HandoffEvent::new(visit_id, from_stage, to_stage))
    }

    /// Like `emit`, taking stage names as strings.
    ///
    /// Unknown stage names drop the event silently.
    pub fn emit_named(&self, visit_id: &str, from_stage: &str, to_stage: &str) -> usize {
        match (from_stage.parse::<Stage>(), to_stage.parse::<Stage>()) {
            (Ok(from), Ok(to)) => self.emit(visit_id, from, to),
            (from, to) => {
                debug!(
                    visit_id = %visit_id,
                    from_stage = %from_stage,
                    to_stage = %to_stage,
                    from_ok = from.is_ok(),
                    to_ok = to.is_ok(),
                    "Dropping hand-off with unknown stage"
                );
                0
            }
        }
    }

    /// Deliver an already-built event to every matching listener.
    pub fn dispatch(&self, event: HandoffEvent) -> usize {
        let Some(inner) = &self.inner else {
            trace!("Hand-off relay detached, dispatch ignored");
            return 0;
        };

        if !event.is_well_formed() {
            debug!(
                from_stage = %event.from_stage,
                to_stage = %event.to_stage,
                "Dropping hand-off without visit id"
            );
            return 0;
        }

        // Listeners registered from here on do not see this event.
        let snapshot = inner.listeners.load_full();
        let mut delivered = 0;

        for registration in snapshot.iter() {
            if !registration.is_active() || !registration.listener.matches(&event) {
                continue;
            }
            invoke(registration, &event);
            delivered += 1;
        }

        debug!(
            visit_id = %event.visit_id,
            from_stage = %event.from_stage,
            to_stage = %event.to_stage,
            delivered,
            "Hand-off dispatched"
        );
        delivered
    }

    /// Subscribe a closure to every hand-off.
    ///
    /// The callback stays registered until the returned handle is dropped
    /// or `unsubscribe` is called on it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&HandoffEvent) + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(FnListener::new("callback", callback)))
    }

    /// Subscribe a closure to hand-offs entering `stage`.
    pub fn subscribe_stage<F>(&self, stage: Stage, callback: F) -> Subscription
    where
        F: Fn(&HandoffEvent) + Send + Sync + 'static,
    {
        let name = format!("{stage}_queue");
        self.subscribe_listener(Arc::new(StageListener::new(
            [stage],
            FnListener::new(name, callback),
        )))
    }

    /// Subscribe a listener object.
    pub fn subscribe_listener(&self, listener: Arc<dyn HandoffListener>) -> Subscription {
        let Some(inner) = &self.inner else {
            trace!(listener = %listener.name(), "Hand-off relay detached, subscribe ignored");
            return Subscription::inert();
        };

        let registration = Arc::new(Registration {
            id: inner.next_id.fetch_add(1, Ordering::Relaxed),
            listener,
            active: AtomicBool::new(true),
        });

        inner.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(registration.clone());
            next
        });
        debug!(
            listener = %registration.listener.name(),
            id = registration.id,
            "Registered hand-off listener"
        );

        Subscription {
            relay: Arc::downgrade(inner),
            registration: Some(registration),
        }
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .as_ref()
            .map(|inner| inner.listeners.load().len())
            .unwrap_or(0)
    }

    /// Check if there are any registered listeners.
    pub fn has_listeners(&self) -> bool {
        self.listener_count() > 0
    }
}

/// Run one listener, containing its errors and panics.
fn invoke(registration: &Registration, event: &HandoffEvent) {
    let listener = &registration.listener;
    let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_handoff(event)));

    match result {
        Ok(Ok(())) => {
            trace!(listener = %listener.name(), "Listener handled hand-off");
        }
        Ok(Err(e)) => {
            warn!(
                listener = %listener.name(),
                visit_id = %event.visit_id,
                error = %e,
                "Hand-off listener failed"
            );
        }
        Err(panic) => {
            let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!(
                listener = %listener.name(),
                visit_id = %event.visit_id,
                panic = %panic_msg,
                "Hand-off listener panicked!"
            );
        }
    }
}

impl Default for HandoffRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandoffRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffRelay")
            .field("attached", &self.is_attached())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Scoped registration returned by `HandoffRelay::subscribe*`.
///
/// Dropping the handle deregisters the listener. Once deregistered the
/// listener is never called again, including by an emission in progress.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    relay: Weak<RelayInner>,
    registration: Option<Arc<Registration>>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            relay: Weak::new(),
            registration: None,
        }
    }

    /// Deregister the listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.registration
            .as_ref()
            .is_some_and(|r| r.is_active())
            && self.relay.upgrade().is_some()
    }

    fn release(&mut self) {
        let Some(registration) = self.registration.take() else {
            return;
        };
        registration.active.store(false, Ordering::Release);
        if let Some(inner) = self.relay.upgrade() {
            inner.remove(registration.id);
        }
        debug!(
            listener = %registration.listener.name(),
            id = registration.id,
            "Unregistered hand-off listener"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.registration.as_ref().map(|r| r.id))
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::listeners::ListenerError;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    struct CountingListener {
        name: &'static str,
        count: AtomicU32,
    }

    impl CountingListener {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                count: AtomicU32::new(0),
            }
        }

        fn count(&self) -> u32 {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl HandoffListener for CountingListener {
        fn name(&self) -> &str {
            self.name
        }

        fn on_handoff(&self, _event: &HandoffEvent) -> Result<(), ListenerError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanicListener;

    impl HandoffListener for PanicListener {
        fn name(&self) -> &str {
            "panic_listener"
        }

        fn on_handoff(&self, _event: &HandoffEvent) -> Result<(), ListenerError> {
            panic!("This listener panics!");
        }
    }

    struct FailingListener;

    impl HandoffListener for FailingListener {
        fn name(&self) -> &str {
            "failing_listener"
        }

        fn on_handoff(&self, _event: &HandoffEvent) -> Result<(), ListenerError> {
            Err(ListenerError::refresh("store unavailable"))
        }
    }

    #[test]
    fn test_relay_creation() {
        let relay = HandoffRelay::new();
        assert!(relay.is_attached());
        assert_eq!(relay.listener_count(), 0);
        assert!(!relay.has_listeners());
    }

    #[test]
    fn test_subscribe_and_drop() {
        let relay = HandoffRelay::new();
        let subscription = relay.subscribe(|_| {});
        assert_eq!(relay.listener_count(), 1);
        assert!(subscription.is_active());

        drop(subscription);
        assert_eq!(relay.listener_count(), 0);
    }

    #[test]
    fn test_emit_without_listeners() {
        let relay = HandoffRelay::new();
        assert_eq!(relay.emit("visit-1", Stage::Registration, Stage::Nurse), 0);
    }

    #[test]
    fn test_emit_counts_deliveries() {
        let relay = HandoffRelay::new();
        let first = Arc::new(CountingListener::new("first"));
        let second = Arc::new(CountingListener::new("second"));
        let _a = relay.subscribe_listener(first.clone());
        let _b = relay.subscribe_listener(second.clone());

        assert_eq!(relay.emit("visit-1", Stage::Nurse, Stage::Doctor), 2);
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
    }

    #[test]
    fn test_registration_order() {
        let relay = HandoffRelay::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = (0..3)
            .map(|i| {
                let order = order.clone();
                relay.subscribe(move |_| order.lock().unwrap().push(i))
            })
            .collect();

        relay.emit("visit-1", Stage::Doctor, Stage::Lab);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_blank_visit_id_dropped() {
        let relay = HandoffRelay::new();
        let listener = Arc::new(CountingListener::new("counter"));
        let _sub = relay.subscribe_listener(listener.clone());

        assert_eq!(relay.emit("", Stage::Nurse, Stage::Doctor), 0);
        assert_eq!(relay.emit("   ", Stage::Nurse, Stage::Doctor), 0);
        assert_eq!(listener.count(), 0);
    }

    #[test]
    fn test_emit_named() {
        let relay = HandoffRelay::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = relay.subscribe(move |e| sink.lock().unwrap().push((e.from_stage, e.to_stage)));

        assert_eq!(relay.emit_named("visit-1", "Lab", "pharmacy"), 1);
        assert_eq!(relay.emit_named("visit-1", "lab", "radiology"), 0);
        assert_eq!(relay.emit_named("visit-1", "", "billing"), 0);
        assert_eq!(*seen.lock().unwrap(), vec![(Stage::Lab, Stage::Pharmacy)]);
    }

    #[test]
    fn test_subscribe_stage_filters() {
        let relay = HandoffRelay::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let _sub = relay.subscribe_stage(Stage::Lab, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(relay.emit("v", Stage::Doctor, Stage::Lab), 1);
        assert_eq!(relay.emit("v", Stage::Lab, Stage::Pharmacy), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_isolation() {
        let relay = HandoffRelay::new();
        let counter = Arc::new(CountingListener::new("counter"));
        let _p = relay.subscribe_listener(Arc::new(PanicListener));
        let _c = relay.subscribe_listener(counter.clone());

        // Must not unwind into the emitter
        assert_eq!(relay.emit("visit-1", Stage::Nurse, Stage::Doctor), 2);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_error_isolation() {
        let relay = HandoffRelay::new();
        let counter = Arc::new(CountingListener::new("counter"));
        let _f = relay.subscribe_listener(Arc::new(FailingListener));
        let _c = relay.subscribe_listener(counter.clone());

        relay.emit("visit-1", Stage::Pharmacy, Stage::Billing);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let relay = HandoffRelay::new();
        let late = Arc::new(CountingListener::new("late"));

        // First listener tears down the second mid-emission.
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot = victim.clone();
        let _killer = relay.subscribe(move |_| {
            slot.lock().unwrap().take();
        });
        *victim.lock().unwrap() = Some(relay.subscribe_listener(late.clone()));

        assert_eq!(relay.emit("visit-1", Stage::Nurse, Stage::Doctor), 1);
        assert_eq!(late.count(), 0);
        assert_eq!(relay.listener_count(), 1);
    }

    #[test]
    fn test_subscribe_during_dispatch_not_delivered() {
        let relay = HandoffRelay::new();
        let late = Arc::new(CountingListener::new("late"));
        let held = Arc::new(Mutex::new(Vec::new()));

        let relay_handle = relay.clone();
        let late_handle = late.clone();
        let held_handle = held.clone();
        let _spawner = relay.subscribe(move |_| {
            let sub = relay_handle.subscribe_listener(late_handle.clone());
            held_handle.lock().unwrap().push(sub);
        });

        relay.emit("visit-1", Stage::Registration, Stage::Nurse);
        assert_eq!(late.count(), 0);

        relay.emit("visit-2", Stage::Registration, Stage::Nurse);
        assert_eq!(late.count(), 1);
        held.lock().unwrap().clear();
    }

    #[test]
    fn test_reentrant_emit() {
        let relay = HandoffRelay::new();
        let counter = Arc::new(CountingListener::new("counter"));
        let _c = relay.subscribe_listener(counter.clone());

        let relay_handle = relay.clone();
        let _chain = relay.subscribe_stage(Stage::Doctor, move |e| {
            relay_handle.emit(e.visit_id.clone(), Stage::Doctor, Stage::Lab);
        });

        relay.emit("visit-1", Stage::Nurse, Stage::Doctor);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_detached_relay_is_noop() {
        let relay = HandoffRelay::detached();
        assert!(!relay.is_attached());

        let subscription = relay.subscribe(|_| panic!("must never run"));
        assert!(!subscription.is_active());
        assert_eq!(relay.listener_count(), 0);
        assert_eq!(relay.emit("visit-1", Stage::Nurse, Stage::Doctor), 0);
        subscription.unsubscribe();
    }

    #[test]
    fn test_subscription_outlives_relay() {
        let relay = HandoffRelay::new();
        let subscription = relay.subscribe(|_| {});
        assert!(subscription.is_active());

        drop(relay);
        assert!(!subscription.is_active());
        subscription.unsubscribe();
    }

    #[test]
    fn test_subscription_stays_active_while_a_clone_lives() {
        let relay = HandoffRelay::new();
        let view_handle = relay.clone();
        let subscription = relay.subscribe(|_| {});

        drop(relay);
        assert!(subscription.is_active());
        assert_eq!(view_handle.emit("visit-1", Stage::Nurse, Stage::Doctor), 1);

        drop(view_handle);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_from_config() {
        assert!(HandoffRelay::from_config(&RelayConfig::default()).is_attached());

        let disabled = RelayConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!HandoffRelay::from_config(&disabled).is_attached());
    }

    #[test]
    fn test_config_validation() {
        assert!(RelayConfig::default().validate().is_ok());
        let bad = RelayConfig {
            broadcast_capacity: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_shared_clones() {
        let relay = HandoffRelay::new();
        let clone = relay.clone();
        let _sub = relay.subscribe(|_| {});
        assert_eq!(clone.listener_count(), 1);
        assert!(format!("{clone:?}").contains("listener_count: 1"));
    }
}
