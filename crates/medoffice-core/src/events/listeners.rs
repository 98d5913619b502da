//! Listener traits for the visit hand-off relay.
//!
//! Listeners are synchronous callbacks run inline with `emit`. They are:
//! - **Quick**: a slow listener delays the stage-transition action that emitted
//! - **Isolated**: errors and panics in one listener don't affect others
//! - **Filterable**: a queue view usually only cares about its own stage

use super::types::{HandoffEvent, Stage};

/// Error type a listener may report back to the relay.
///
/// The relay logs these and moves on; they never reach the emitter.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Listener failed with a message.
    #[error("Listener execution failed: {0}")]
    Execution(String),

    /// Listener failed to schedule a refresh of its queue view.
    #[error("Queue refresh failed: {0}")]
    Refresh(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ListenerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        ListenerError::Execution(msg.into())
    }

    /// Create a refresh error from a string.
    pub fn refresh(msg: impl Into<String>) -> Self {
        ListenerError::Refresh(msg.into())
    }
}

// ============================================================================
// Listener Trait
// ============================================================================

/// Trait for hand-off listeners.
///
/// # Example
///
/// ```ignore
/// struct LabQueueView {
///     refresh: std::sync::mpsc::Sender<()>,
/// }
///
/// impl HandoffListener for LabQueueView {
///     fn name(&self) -> &str { "lab_queue_view" }
///     fn stages(&self) -> &[Stage] { &[Stage::Lab] }
///
///     fn on_handoff(&self, _event: &HandoffEvent) -> Result<(), ListenerError> {
///         self.refresh.send(()).map_err(|e| ListenerError::refresh(e.to_string()))
///     }
/// }
/// ```
pub trait HandoffListener: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Destination stages this listener is interested in.
    ///
    /// Return an empty slice to receive every hand-off.
    fn stages(&self) -> &[Stage] {
        &[]
    }

    /// Handle a hand-off. Runs inline with the emitting call.
    fn on_handoff(&self, event: &HandoffEvent) -> Result<(), ListenerError>;

    /// Check if this listener should see the given event.
    fn matches(&self, event: &HandoffEvent) -> bool {
        event.enters_any(self.stages())
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Listener backed by a plain closure.
pub struct FnListener<F> {
    name: String,
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(&HandoffEvent) + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> HandoffListener for FnListener<F>
where
    F: Fn(&HandoffEvent) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_handoff(&self, event: &HandoffEvent) -> Result<(), ListenerError> {
        (self.callback)(event);
        Ok(())
    }
}

/// Wrapper restricting a listener to hand-offs entering the given stages.
pub struct StageListener<L> {
    stages: Vec<Stage>,
    inner: L,
}

impl<L: HandoffListener> StageListener<L> {
    pub fn new(stages: impl IntoIterator<Item = Stage>, inner: L) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            inner,
        }
    }
}

impl<L: HandoffListener> HandoffListener for StageListener<L> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn on_handoff(&self, event: &HandoffEvent) -> Result<(), ListenerError> {
        self.inner.on_handoff(event)
    }

    fn matches(&self, event: &HandoffEvent) -> bool {
        event.enters_any(&self.stages) && self.inner.matches(event)
    }
}
