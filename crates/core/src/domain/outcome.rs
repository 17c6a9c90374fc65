use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::failure::FailureCategory;
use crate::domain::session::SessionRole;
use crate::error::{CoreError, Result};

/// Terminal status of one step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Opaque handle to a captured evidence artifact (screenshot, console
/// log dump). Keyed by step id and attempt number; written once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceRef {
    pub handle: String,
    pub step_id: String,
    pub attempt: u32,
}

impl EvidenceRef {
    pub fn new(handle: impl Into<String>, step_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            handle: handle.into(),
            step_id: step_id.into(),
            attempt,
        }
    }
}

/// One attempt of a step action, primary or fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// Action class attempted, e.g. `join_channel`.
    pub action_class: String,
    /// Fallback strategy that supplied the action, if not the primary.
    pub fallback_id: Option<String>,
    pub elapsed_ms: u64,
    pub evidence: Option<EvidenceRef>,
    pub error: Option<FailureCategory>,
    pub error_message: Option<String>,
}

/// Final outcome of one step, including the full attempt history so
/// failures are diagnosable without re-running the test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub role: Option<SessionRole>,
    pub status: StepStatus,
    pub attempts: Vec<AttemptRecord>,
    pub elapsed_ms: u64,
    /// Fallback strategy in effect when the step finally succeeded.
    pub fallback_used: Option<String>,
    /// Category of the last failure for failed steps.
    pub error: Option<FailureCategory>,
}

impl StepOutcome {
    pub fn skipped(step_id: impl Into<String>, role: Option<SessionRole>) -> Self {
        Self {
            step_id: step_id.into(),
            role,
            status: StepStatus::Skipped,
            attempts: Vec::new(),
            elapsed_ms: 0,
            fallback_used: None,
            error: None,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Human verdict for the verification step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub comment: String,
    pub collected_at: DateTime<Utc>,
}

impl Verdict {
    pub fn new(passed: bool, comment: impl Into<String>) -> Self {
        Self {
            passed,
            comment: comment.into(),
            collected_at: Utc::now(),
        }
    }
}

/// Overall status of a test run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pass,
    Fail,
    Inconclusive,
    Aborted,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Inconclusive => "inconclusive",
            Self::Aborted => "aborted",
        }
    }
}

/// Aggregated result of one engine run.
///
/// Created empty when the run starts, appended to as steps finish, and
/// sealed once the engine reaches a terminal state. Mutation after
/// sealing is a contract violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub run_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub overall: OverallStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<StepOutcome>,
    pub verdict: Option<Verdict>,
    pub retries: u32,
    pub fallbacks_used: u32,
    sealed: bool,
}

impl TestResult {
    pub fn start(plan_id: Uuid, plan_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            plan_id,
            plan_name: plan_name.into(),
            overall: OverallStatus::Inconclusive,
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            verdict: None,
            retries: 0,
            fallbacks_used: 0,
            sealed: false,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn record_outcome(&mut self, outcome: StepOutcome) -> Result<()> {
        self.ensure_open()?;
        self.retries += outcome.attempt_count().saturating_sub(1);
        if outcome.fallback_used.is_some() {
            self.fallbacks_used += 1;
        }
        self.outcomes.push(outcome);
        Ok(())
    }

    pub fn record_verdict(&mut self, verdict: Verdict) -> Result<()> {
        self.ensure_open()?;
        self.verdict = Some(verdict);
        Ok(())
    }

    /// Finish the run: set the overall status and freeze the result.
    pub fn seal(&mut self, overall: OverallStatus) -> Result<()> {
        self.ensure_open()?;
        self.overall = overall;
        self.finished_at = Some(Utc::now());
        self.sealed = true;
        Ok(())
    }

    pub fn succeeded_steps(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Succeeded)
            .count()
    }

    pub fn failed_steps(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Failed)
            .count()
    }

    pub fn skipped_steps(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Skipped)
            .count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.sealed {
            Err(CoreError::ResultSealed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded(step_id: &str, attempts: u32) -> StepOutcome {
        StepOutcome {
            step_id: step_id.to_string(),
            role: Some(SessionRole::Publisher),
            status: StepStatus::Succeeded,
            attempts: (1..=attempts)
                .map(|n| AttemptRecord {
                    attempt: n,
                    action_class: "launch".to_string(),
                    fallback_id: None,
                    elapsed_ms: 5,
                    evidence: None,
                    error: None,
                    error_message: None,
                })
                .collect(),
            elapsed_ms: 5 * attempts as u64,
            fallback_used: None,
            error: None,
        }
    }

    #[test]
    fn test_result_lifecycle() {
        let mut result = TestResult::start(Uuid::new_v4(), "audio-interop");
        assert!(!result.is_sealed());

        result.record_outcome(succeeded("launch", 1)).unwrap();
        result.record_verdict(Verdict::new(true, "audio heard")).unwrap();
        result.seal(OverallStatus::Pass).unwrap();

        assert!(result.is_sealed());
        assert!(result.finished_at.is_some());
        assert_eq!(result.overall, OverallStatus::Pass);
        assert_eq!(result.succeeded_steps(), 1);
    }

    #[test]
    fn test_sealed_result_rejects_mutation() {
        let mut result = TestResult::start(Uuid::new_v4(), "audio-interop");
        result.seal(OverallStatus::Fail).unwrap();

        assert!(matches!(
            result.record_outcome(succeeded("launch", 1)),
            Err(CoreError::ResultSealed)
        ));
        assert!(matches!(
            result.record_verdict(Verdict::new(true, "")),
            Err(CoreError::ResultSealed)
        ));
        assert!(matches!(
            result.seal(OverallStatus::Pass),
            Err(CoreError::ResultSealed)
        ));
    }

    #[test]
    fn test_retry_and_fallback_counters() {
        let mut result = TestResult::start(Uuid::new_v4(), "audio-interop");

        let mut with_fallback = succeeded("publish", 2);
        with_fallback.fallback_used = Some("publish-via-menu".to_string());
        result.record_outcome(with_fallback).unwrap();
        result.record_outcome(succeeded("join", 3)).unwrap();

        assert_eq!(result.retries, 3);
        assert_eq!(result.fallbacks_used, 1);
    }

    #[test]
    fn test_skipped_outcome() {
        let outcome = StepOutcome::skipped("join", Some(SessionRole::Subscriber));
        assert_eq!(outcome.status, StepStatus::Skipped);
        assert_eq!(outcome.attempt_count(), 0);
    }
}
