//! Visit hand-off signaling for queue views.
//!
//! When a stage-transition action (e.g. "send patient to lab") has persisted
//! the move, it emits a `HandoffEvent` on the relay. Queue views for the
//! destination stage are subscribed and re-query their queue contents.
//!
//! # Architecture
//!
//! ```text
//!  stage-transition action
//!            │ emit(visit_id, from, to)
//!            ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Hand-off Relay                               │
//! │            (copy-on-write listener set, inline dispatch)             │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!    ┌──────────┐        ┌──────────┐        ┌──────────────┐
//!    │ Lab view │        │ Doc view │        │ Broadcaster  │──▶ async views
//!    │  (sync)  │        │  (sync)  │        │ (tokio chan) │
//!    └──────────┘        └──────────┘        └──────────────┘
//! ```
//!
//! Delivery is best-effort and local to one process: no retention, no
//! replay, nothing for listeners registered after an emission.
//!
//! # Module Structure
//!
//! - [`types`]: `Stage` and `HandoffEvent`
//! - [`listeners`]: listener trait, closure and stage-filter adapters
//! - [`relay`]: the relay, its configuration and scoped subscriptions
//! - [`bridge`]: forwarding into a tokio broadcast channel

pub mod bridge;
pub mod listeners;
pub mod relay;
pub mod types;

pub use bridge::HandoffBroadcaster;
pub use listeners::{FnListener, HandoffListener, ListenerError, StageListener};
pub use relay::{HandoffRelay, RelayConfig, Subscription};
pub use types::{HandoffEvent, Stage};
