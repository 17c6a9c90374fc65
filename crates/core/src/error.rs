use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Plan contains no steps")]
    EmptyPlan,

    #[error("Duplicate step id in plan: {0}")]
    DuplicateStepId(String),

    #[error("Plan declares more than one verification step")]
    MultipleVerificationSteps,

    #[error("Step {step_id} has zero timeout")]
    ZeroTimeout { step_id: String },

    #[error("Duplicate fallback id {fallback_id} on step {step_id}")]
    DuplicateFallbackId { step_id: String, fallback_id: String },

    #[error("Test result is sealed and cannot be modified")]
    ResultSealed,
}

pub type Result<T> = std::result::Result<T, CoreError>;
