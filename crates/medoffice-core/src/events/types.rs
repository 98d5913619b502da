//! Event types for the visit hand-off relay.
//!
//! - `Stage` - the fixed set of departmental queues a visit passes through
//! - `HandoffEvent` - a visit moving from one stage's queue to another's

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::CoreError;
use crate::id::{IdError, validate_visit_id};

// ============================================================================
// Stages
// ============================================================================

/// A departmental queue in the patient-visit workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Front desk check-in
    Registration,
    /// Vitals and intake
    Nurse,
    /// Consultation
    Doctor,
    /// Specimen collection and results
    Lab,
    /// Dispensing
    Pharmacy,
    /// Invoicing and payment
    Billing,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Stage; 6] = [
        Stage::Registration,
        Stage::Nurse,
        Stage::Doctor,
        Stage::Lab,
        Stage::Pharmacy,
        Stage::Billing,
    ];

    /// Returns the string representation of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Registration => "registration",
            Stage::Nurse => "nurse",
            Stage::Doctor => "doctor",
            Stage::Lab => "lab",
            Stage::Pharmacy => "pharmacy",
            Stage::Billing => "billing",
        }
    }

    /// Position of the stage in workflow order.
    pub fn position(&self) -> usize {
        *self as usize
    }

    /// The canonical next stage, `None` after billing.
    pub fn next(&self) -> Option<Stage> {
        Stage::ALL.get(self.position() + 1).copied()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registration" => Ok(Stage::Registration),
            "nurse" => Ok(Stage::Nurse),
            "doctor" => Ok(Stage::Doctor),
            "lab" => Ok(Stage::Lab),
            "pharmacy" => Ok(Stage::Pharmacy),
            "billing" => Ok(Stage::Billing),
            other => Err(CoreError::unknown_stage(other)),
        }
    }
}

// ============================================================================
// Hand-off Events
// ============================================================================

/// Signal that a visit left one stage's queue and entered another's.
///
/// Carries identification only. Listeners re-read queue state from the
/// system of record; the event is a refresh trigger, not a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffEvent {
    /// Visit being transitioned
    pub visit_id: String,
    /// Stage the visit is leaving
    pub from_stage: Stage,
    /// Stage the visit is entering
    pub to_stage: Stage,
    /// When the transition was signaled (epoch millis on the wire)
    #[serde(with = "crate::time::epoch_millis")]
    pub timestamp: OffsetDateTime,
}

impl HandoffEvent {
    /// Create a new hand-off event stamped with the current time.
    pub fn new(visit_id: impl Into<String>, from_stage: Stage, to_stage: Stage) -> Self {
        Self {
            visit_id: visit_id.into(),
            from_stage,
            to_stage,
            timestamp: crate::time::now_utc(),
        }
    }

    /// Timestamp as milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        crate::time::unix_millis(&self.timestamp)
    }

    /// Whether the event carries enough identification to be delivered.
    ///
    /// Only a blank visit id disqualifies an event; stricter id rules are
    /// enforced by whoever persists the transition.
    pub fn is_well_formed(&self) -> bool {
        validate_visit_id(&self.visit_id) != Err(IdError::Empty)
    }

    /// True when the visit actually changes stage. Not enforced by the relay.
    pub fn is_transition(&self) -> bool {
        self.from_stage != self.to_stage
    }

    /// True when the destination comes later in workflow order.
    pub fn is_forward(&self) -> bool {
        self.to_stage > self.from_stage
    }

    /// Check if this event enters one of the given stages (empty matches all).
    pub fn enters_any(&self, stages: &[Stage]) -> bool {
        stages.is_empty() || stages.contains(&self.to_stage)
    }
}
