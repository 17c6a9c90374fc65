//! Adaptive execution engine for two-session browser interop tests.
//!
//! The engine turns a declarative [`interop_core::ExecutionPlan`] into
//! reliable action against two independently failing browser sessions:
//! bounded retries with backoff, per-operation-class circuit breaking,
//! ordered fallback strategies, a synchronization barrier before the
//! manual verification step, and cooperative cancellation with
//! guaranteed session cleanup.

pub mod breaker;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod state_machine;
pub mod step_executor;

pub use breaker::{Admission, BreakerState, CircuitBreaker};
pub use collaborators::{PlanSource, ResultSink, VerificationCollaborator, VerificationContext};
pub use config::{Backoff, BreakerConfig, EngineConfig, RetryConfig};
pub use engine::{ExecutionEngine, FixedVerdict};
pub use error::{EngineError, Result};
pub use fallback::FallbackSelector;
pub use orchestrator::{OrchestrationReport, SessionOrchestrator};
pub use retry::RetryPolicy;
pub use session::{Session, SessionCapability};
pub use state_machine::SessionStateMachine;
pub use step_executor::StepExecutor;
