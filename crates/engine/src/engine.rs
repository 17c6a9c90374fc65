//! Top-level execution engine: validation, orchestration, the manual
//! verification gate and result aggregation.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use events::{Event, EventBus};
use interop_core::{
    ExecutionPlan, OverallStatus, SessionRole, Step, StepOutcome, StepTarget, TestResult, Verdict,
};

use crate::collaborators::{ResultSink, VerificationCollaborator, VerificationContext};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::orchestrator::{OrchestrationReport, SessionOrchestrator};
use crate::session::{Session, SessionCapability};

/// Runs one execution plan across a publisher and a subscriber session
/// and produces a sealed [`TestResult`].
///
/// The engine owns the cancellation token for the run; callers keep a
/// clone to request a graceful stop from signal handlers or a UI.
pub struct ExecutionEngine {
    config: EngineConfig,
    events: EventBus,
    cancel: CancellationToken,
    sink: Option<Arc<dyn ResultSink>>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
            sink: None,
        }
    }

    /// Publish the sealed result of every run to `sink`. Submission
    /// failures are logged and never change the run's outcome.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Token observed by every task of a run; cancelling it stops the
    /// run at the next attempt boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn run(
        &self,
        plan: ExecutionPlan,
        publisher: Box<dyn SessionCapability>,
        subscriber: Box<dyn SessionCapability>,
        verifier: &dyn VerificationCollaborator,
    ) -> Result<TestResult> {
        plan.validate().map_err(EngineError::InvalidPlan)?;
        Self::validate_barrier(&plan)?;

        let mut result = TestResult::start(plan.id, plan.name.clone());
        info!(
            run_id = %result.run_id,
            plan = %plan.name,
            steps = plan.steps.len(),
            "Run started"
        );
        self.events.publish(Event::RunStarted {
            run_id: result.run_id,
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            steps: plan.steps.len(),
        });

        let plan = Arc::new(plan);
        let orchestrator =
            SessionOrchestrator::new(self.config.clone(), self.events.clone(), self.cancel.clone());
        let pub_session = Session::new(SessionRole::Publisher, publisher, self.events.clone());
        let sub_session = Session::new(SessionRole::Subscriber, subscriber, self.events.clone());

        let mut report = orchestrator.run(plan.clone(), pub_session, sub_session).await?;
        for outcome in report.outcomes.drain(..) {
            result.record_outcome(outcome)?;
        }

        let overall = self
            .finish_run(&plan, &report, &mut result, verifier)
            .await?;

        self.close_sessions(&mut report).await;

        result.seal(overall)?;
        info!(
            run_id = %result.run_id,
            overall = %overall.as_str(),
            succeeded = result.succeeded_steps(),
            failed = result.failed_steps(),
            skipped = result.skipped_steps(),
            "Run finished"
        );
        self.events.publish(Event::RunFinished {
            run_id: result.run_id,
            overall,
        });

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.submit(&result).await {
                warn!(run_id = %result.run_id, error = %e, "Result submission failed");
                self.events.publish(Event::Error {
                    message: format!("result submission failed: {e}"),
                    context: Some(result.run_id.to_string()),
                });
            }
        }

        Ok(result)
    }

    /// Decide the overall status, collecting the human verdict when
    /// both sides made it to the gate.
    async fn finish_run(
        &self,
        plan: &ExecutionPlan,
        report: &OrchestrationReport,
        result: &mut TestResult,
        verifier: &dyn VerificationCollaborator,
    ) -> Result<OverallStatus> {
        let verification = plan.verification_step();

        if report.cancelled {
            if let Some(step) = verification {
                result.record_outcome(StepOutcome::skipped(step.id.clone(), None))?;
            }
            return Ok(OverallStatus::Aborted);
        }

        if report.failed || !report.both_ready {
            if let Some(step) = verification {
                result.record_outcome(StepOutcome::skipped(step.id.clone(), None))?;
            }
            return Ok(OverallStatus::Fail);
        }

        let Some(step) = verification else {
            // Fully automated plan: every step succeeded.
            return Ok(OverallStatus::Pass);
        };

        self.events.publish(Event::VerificationRequested {
            run_id: result.run_id,
        });
        let context = VerificationContext {
            run_id: result.run_id,
            instructions: Self::instructions_of(step),
            evidence: result
                .outcomes
                .iter()
                .flat_map(|o| o.attempts.iter())
                .filter_map(|a| a.evidence.clone())
                .collect(),
        };

        let collected = tokio::select! {
            _ = self.cancel.cancelled() => {
                result.record_outcome(StepOutcome::skipped(step.id.clone(), None))?;
                return Ok(OverallStatus::Aborted);
            }
            verdict = verifier.collect_verdict(context) => verdict,
        };

        match collected {
            Ok(verdict) => {
                self.events.publish(Event::VerdictCollected {
                    run_id: result.run_id,
                    passed: verdict.passed,
                });
                result.record_outcome(Self::verification_outcome(step, true))?;
                let overall = if verdict.passed {
                    OverallStatus::Pass
                } else {
                    OverallStatus::Fail
                };
                result.record_verdict(verdict)?;
                Ok(overall)
            }
            Err(e) => {
                warn!(error = %e, "Verdict collection failed");
                self.events.publish(Event::Error {
                    message: format!("verdict collection failed: {e}"),
                    context: Some(step.id.clone()),
                });
                result.record_outcome(Self::verification_outcome(step, false))?;
                Ok(OverallStatus::Inconclusive)
            }
        }
    }

    async fn close_sessions(&self, report: &mut OrchestrationReport) {
        let grace = self.config.close_grace;
        report.publisher.close(grace).await;
        report.subscriber.close(grace).await;
    }

    /// Every `Both` step is the synchronization barrier and must be the
    /// verification gate; any other shared step is a plan defect.
    fn validate_barrier(plan: &ExecutionPlan) -> Result<()> {
        for step in &plan.steps {
            if step.target == StepTarget::Both && !step.is_verification() {
                return Err(EngineError::NonVerificationBarrierStep {
                    step_id: step.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn instructions_of(step: &Step) -> String {
        match &step.action {
            interop_core::StepAction::AwaitVerification { instructions } => instructions.clone(),
            _ => String::new(),
        }
    }

    fn verification_outcome(step: &Step, succeeded: bool) -> StepOutcome {
        StepOutcome {
            step_id: step.id.clone(),
            role: None,
            status: if succeeded {
                interop_core::StepStatus::Succeeded
            } else {
                interop_core::StepStatus::Failed
            },
            attempts: Vec::new(),
            elapsed_ms: 0,
            fallback_used: None,
            error: None,
        }
    }
}

/// Convenience wrapper: a verdict that is always the same, for
/// automated environments without a human observer.
pub struct FixedVerdict {
    passed: bool,
    comment: String,
}

impl FixedVerdict {
    pub fn passing(comment: impl Into<String>) -> Self {
        Self {
            passed: true,
            comment: comment.into(),
        }
    }

    pub fn failing(comment: impl Into<String>) -> Self {
        Self {
            passed: false,
            comment: comment.into(),
        }
    }
}

#[async_trait::async_trait]
impl VerificationCollaborator for FixedVerdict {
    async fn collect_verdict(&self, _context: VerificationContext) -> Result<Verdict> {
        Ok(Verdict::new(self.passed, self.comment.clone()))
    }
}
