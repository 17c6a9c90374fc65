use interop_core::{CoreError, SessionRole, SessionState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(CoreError),

    #[error("Invalid plan: step {step_id} targets both sessions but is not a verification step")]
    NonVerificationBarrierStep { step_id: String },

    #[error("Invalid session transition for {role}: {from} -> {to}")]
    InvalidTransition {
        role: SessionRole,
        from: SessionState,
        to: SessionState,
    },

    #[error("{role} session task aborted unexpectedly")]
    SessionTaskAborted { role: SessionRole },

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Result bookkeeping error: {0}")]
    Core(#[from] CoreError),
}

impl EngineError {
    pub fn collaborator(reason: impl Into<String>) -> Self {
        Self::Collaborator(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
