//! Async bridge from the synchronous relay into a tokio broadcast channel.
//!
//! Queue views rendered by async handlers (server-sent events, websockets)
//! can't block inside a relay callback. `HandoffBroadcaster` is a listener
//! that forwards each hand-off into a broadcast channel they `recv().await` on.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::listeners::{HandoffListener, ListenerError};
use super::relay::{HandoffRelay, RelayConfig, Subscription};
use super::types::{HandoffEvent, Stage};

/// Listener forwarding hand-offs to async subscribers.
///
/// Events beyond the channel capacity are dropped for slow receivers.
#[derive(Clone)]
pub struct HandoffBroadcaster {
    sender: broadcast::Sender<HandoffEvent>,
    stages: Vec<Stage>,
}

impl HandoffBroadcaster {
    /// Create a broadcaster with the given buffer size, forwarding every stage.
    ///
    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            stages: Vec::new(),
        }
    }

    /// Create a broadcaster sized from relay configuration.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::with_capacity(config.broadcast_capacity)
    }

    /// Only forward hand-offs entering the given stages.
    pub fn for_stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    /// Register this broadcaster on a relay.
    pub fn attach(self: &Arc<Self>, relay: &HandoffRelay) -> Subscription {
        relay.subscribe_listener(Arc::clone(self) as Arc<dyn HandoffListener>)
    }

    /// Subscribe to forwarded events.
    ///
    /// Events forwarded before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<HandoffEvent> {
        self.sender.subscribe()
    }

    /// Get the number of async receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl HandoffListener for HandoffBroadcaster {
    fn name(&self) -> &str {
        "handoff_broadcaster"
    }

    fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn on_handoff(&self, event: &HandoffEvent) -> Result<(), ListenerError> {
        // No receivers is not a failure: no async view is open right now.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

impl std::fmt::Debug for HandoffBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffBroadcaster")
            .field("stages", &self.stages)
            .field("receiver_count", &self.receiver_count())
            .finish()
    }
}
