//! Integration seams between the engine and the embedding application.
//!
//! The engine owns orchestration and policy; loading plans, collecting
//! the human verdict and publishing results are delegated through these
//! traits so the same engine runs under a CLI, a service or a test.

use async_trait::async_trait;

use interop_core::{EvidenceRef, ExecutionPlan, TestResult, Verdict};

use crate::error::Result;

/// Everything a human (or a surrogate under test) needs to judge the
/// verification step: the plan's instructions plus the evidence handles
/// collected along the way.
#[derive(Debug, Clone)]
pub struct VerificationContext {
    pub run_id: uuid::Uuid,
    pub instructions: String,
    pub evidence: Vec<EvidenceRef>,
}

/// Collects the manual pass/fail verdict once both sessions are ready.
///
/// The engine blocks on this call (subject to cancellation) with both
/// sessions intentionally left open, so the observer can inspect live
/// media. An error means the verdict could not be collected at all and
/// yields an inconclusive run.
#[async_trait]
pub trait VerificationCollaborator: Send + Sync {
    async fn collect_verdict(&self, context: VerificationContext) -> Result<Verdict>;
}

/// Supplies execution plans to the engine's embedder.
#[async_trait]
pub trait PlanSource: Send + Sync {
    async fn load(&self) -> Result<ExecutionPlan>;
}

/// Receives the sealed result of a run.
///
/// Submission failures are reported to the caller but never change the
/// outcome of the run itself.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn submit(&self, result: &TestResult) -> Result<()>;
}
