//! Application context owning the hand-off relay.
//!
//! Queue views and stage-transition actions get the relay from here instead
//! of reaching for a process-wide bus.

use std::sync::Arc;

use medoffice_core::events::{HandoffBroadcaster, HandoffRelay, Subscription};
use tracing::info;

use crate::config::{AppConfig, ConfigError, loader};
use crate::observability;

pub struct AppContext {
    config: AppConfig,
    relay: HandoffRelay,
}

impl AppContext {
    /// Build the context from an already-validated configuration.
    pub fn from_config(config: AppConfig) -> Self {
        let relay = HandoffRelay::from_config(&config.relay);
        info!(attached = relay.is_attached(), "Hand-off relay ready");
        Self { config, relay }
    }

    /// Load configuration, start tracing and build the context.
    pub fn init(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config = loader::load_config(config_path)?;
        observability::init_tracing(&config.logging);
        Ok(Self::from_config(config))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The relay handed to queue views and stage-transition actions.
    pub fn relay(&self) -> &HandoffRelay {
        &self.relay
    }

    /// Create an async bridge attached to this context's relay.
    ///
    /// The bridge stays registered while the returned subscription lives.
    pub fn broadcaster(&self) -> (Arc<HandoffBroadcaster>, Subscription) {
        let broadcaster = Arc::new(HandoffBroadcaster::from_config(&self.config.relay));
        let subscription = broadcaster.attach(&self.relay);
        (broadcaster, subscription)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}
