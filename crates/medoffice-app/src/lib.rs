//! Application wiring for the medical-office hand-off relay: configuration,
//! tracing and the context that owns the relay.

pub mod config;
pub mod context;
pub mod observability;

pub use config::{AppConfig, ConfigError, LoggingConfig};
pub use context::AppContext;
