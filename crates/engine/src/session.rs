//! Session ownership and lifecycle.
//!
//! The engine never drives a browser itself; it calls an opaque
//! [`SessionCapability`] supplied by the embedding application. This
//! module wraps one capability with the lifecycle state machine and
//! guaranteed, idempotent closing.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use events::{Event, EventBus};
use interop_core::{EvidenceRef, SessionRole, SessionState, StepAction, StepFailure};

use crate::error::{EngineError, Result};
use crate::state_machine::SessionStateMachine;

/// Browser-driving capability for one session.
///
/// Implementations live outside the engine (webdriver bridge,
/// puppeteer bridge, simulator). Every call fails with a categorized
/// [`StepFailure`] on timeout, element absence or transport loss.
#[async_trait]
pub trait SessionCapability: Send {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), StepFailure>;

    /// Execute one tagged action with its opaque parameter map.
    async fn perform_action(
        &mut self,
        action: &StepAction,
        params: &Map<String, Value>,
    ) -> std::result::Result<Value, StepFailure>;

    /// Wait until the described condition holds, up to `timeout`.
    /// `Ok(false)` means the condition was not met in time.
    async fn wait_for_state(
        &mut self,
        description: &str,
        timeout: Duration,
    ) -> std::result::Result<bool, StepFailure>;

    /// Capture a diagnostic artifact and return its opaque handle.
    async fn capture_evidence(&mut self) -> std::result::Result<String, StepFailure>;

    async fn close(&mut self) -> std::result::Result<(), StepFailure>;
}

/// One browser session: role, lifecycle state and the capability that
/// actually drives it. Owned exclusively by the orchestrator task for
/// its role; never shared across tasks.
pub struct Session {
    role: SessionRole,
    state: SessionState,
    capability: Box<dyn SessionCapability>,
    events: EventBus,
}

impl Session {
    pub fn new(role: SessionRole, capability: Box<dyn SessionCapability>, events: EventBus) -> Self {
        Self {
            role,
            state: SessionState::Uninitialized,
            capability,
            events,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capability(&mut self) -> &mut dyn SessionCapability {
        self.capability.as_mut()
    }

    /// Advance the lifecycle after `action` succeeded, if the action
    /// moves the lifecycle at all. Re-running an action that leaves
    /// the session in its current state is not a transition.
    pub fn advance(&mut self, action: &StepAction) -> Result<()> {
        match action.state_after() {
            Some(next) if next != self.state => self.transition(next),
            _ => Ok(()),
        }
    }

    pub fn transition(&mut self, to: SessionState) -> Result<()> {
        if !SessionStateMachine::can_transition(self.state, to) {
            return Err(EngineError::InvalidTransition {
                role: self.role,
                from: self.state,
                to,
            });
        }
        let from = self.state;
        self.state = to;
        debug!(role = %self.role.as_str(), from = %from.as_str(), to = %to.as_str(), "Session state changed");
        self.events.publish(Event::SessionStateChanged {
            role: self.role,
            from,
            to,
        });
        Ok(())
    }

    pub fn mark_failed(&mut self) {
        if !self.state.is_terminal() {
            let _ = self.transition(SessionState::Failed);
        }
    }

    pub fn mark_ready(&mut self) -> Result<()> {
        if self.state == SessionState::ReadyForVerification {
            return Ok(());
        }
        self.transition(SessionState::ReadyForVerification)
    }

    /// Capture evidence for one attempt. Failures are logged, not
    /// propagated; missing evidence must never fail a step.
    pub async fn capture_evidence(&mut self, step_id: &str, attempt: u32) -> Option<EvidenceRef> {
        match self.capability.capture_evidence().await {
            Ok(handle) => Some(EvidenceRef::new(handle, step_id, attempt)),
            Err(e) => {
                warn!(
                    role = %self.role.as_str(),
                    step_id,
                    attempt,
                    error = %e,
                    "Evidence capture failed"
                );
                None
            }
        }
    }

    /// Close the underlying browser, bounded by `grace`. Idempotent;
    /// the session ends up `Closed` even if the capability call fails
    /// or times out.
    pub async fn close(&mut self, grace: Duration) {
        if self.state == SessionState::Closed {
            return;
        }
        match tokio::time::timeout(grace, self.capability.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(role = %self.role.as_str(), error = %e, "Session close reported an error")
            }
            Err(_) => {
                warn!(role = %self.role.as_str(), grace_ms = grace.as_millis() as u64, "Session close timed out")
            }
        }
        let from = self.state;
        self.state = SessionState::Closed;
        self.events.publish(Event::SessionStateChanged {
            role: self.role,
            from,
            to: SessionState::Closed,
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                role = %self.role.as_str(),
                state = %self.state.as_str(),
                "Session dropped without being closed"
            );
        }
    }
}
