pub mod domain;
pub mod error;

pub use domain::failure::{FailureCategory, StepFailure};
pub use domain::outcome::{
    AttemptRecord, EvidenceRef, OverallStatus, StepOutcome, StepStatus, TestResult, Verdict,
};
pub use domain::plan::{
    ExecutionPlan, ExpectedOutcome, FallbackCondition, FallbackStrategy, Step, StepAction,
    StepTarget,
};
pub use domain::session::{SessionRole, SessionState};
pub use error::{CoreError, Result};
