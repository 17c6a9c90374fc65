//! Event types emitted by the execution engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use interop_core::{FailureCategory, OverallStatus, SessionRole, SessionState, StepStatus};

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All observable moments of an engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run started executing a validated plan
    #[serde(rename = "run.started")]
    RunStarted {
        run_id: Uuid,
        plan_id: Uuid,
        plan_name: String,
        steps: usize,
    },

    /// A run reached a terminal state
    #[serde(rename = "run.finished")]
    RunFinished {
        run_id: Uuid,
        overall: OverallStatus,
    },

    /// A step started its first attempt
    #[serde(rename = "step.started")]
    StepStarted {
        step_id: String,
        role: SessionRole,
        action_class: String,
    },

    /// One attempt of a step failed; a retry or fallback may follow
    #[serde(rename = "step.attempt_failed")]
    StepAttemptFailed {
        step_id: String,
        role: SessionRole,
        attempt: u32,
        category: FailureCategory,
    },

    /// A fallback strategy was substituted for the primary action
    #[serde(rename = "step.fallback_engaged")]
    FallbackEngaged {
        step_id: String,
        role: SessionRole,
        strategy_id: String,
    },

    /// A step reached a terminal status
    #[serde(rename = "step.finished")]
    StepFinished {
        step_id: String,
        role: SessionRole,
        status: StepStatus,
        attempts: u32,
    },

    /// A circuit breaker changed state for an operation class
    #[serde(rename = "breaker.state_changed")]
    BreakerStateChanged {
        operation_class: String,
        from: String,
        to: String,
    },

    /// A session moved through its lifecycle
    #[serde(rename = "session.state_changed")]
    SessionStateChanged {
        role: SessionRole,
        from: SessionState,
        to: SessionState,
    },

    /// A session finished its pre-barrier subsequence
    #[serde(rename = "session.barrier_reached")]
    BarrierReached { role: SessionRole },

    /// Both sessions are ready; the human verdict is being collected
    #[serde(rename = "verification.requested")]
    VerificationRequested { run_id: Uuid },

    /// The human verdict was collected
    #[serde(rename = "verification.collected")]
    VerdictCollected { run_id: Uuid, passed: bool },

    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Get the step ID associated with this event, if any
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Event::StepStarted { step_id, .. }
            | Event::StepAttemptFailed { step_id, .. }
            | Event::FallbackEngaged { step_id, .. }
            | Event::StepFinished { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// Get the session role associated with this event, if any
    pub fn role(&self) -> Option<SessionRole> {
        match self {
            Event::StepStarted { role, .. }
            | Event::StepAttemptFailed { role, .. }
            | Event::FallbackEngaged { role, .. }
            | Event::StepFinished { role, .. }
            | Event::SessionStateChanged { role, .. }
            | Event::BarrierReached { role } => Some(*role),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_creation() {
        let event = Event::BarrierReached {
            role: SessionRole::Publisher,
        };
        let envelope = EventEnvelope::new(event);

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::StepAttemptFailed {
            step_id: "join".to_string(),
            role: SessionRole::Subscriber,
            attempt: 2,
            category: FailureCategory::Timeout,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("step.attempt_failed"));
        assert!(json.contains("\"timeout\""));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"session.barrier_reached","role":"publisher"}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        match event {
            Event::BarrierReached { role } => assert_eq!(role, SessionRole::Publisher),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_step_id() {
        let event = Event::StepFinished {
            step_id: "publish".to_string(),
            role: SessionRole::Publisher,
            status: StepStatus::Succeeded,
            attempts: 1,
        };
        assert_eq!(event.step_id(), Some("publish"));

        let error_event = Event::Error {
            message: "boom".to_string(),
            context: None,
        };
        assert_eq!(error_event.step_id(), None);
        assert_eq!(error_event.role(), None);
    }
}
