use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::failure::FailureCategory;
use crate::domain::session::{SessionRole, SessionState};
use crate::error::{CoreError, Result};

const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

/// Which session(s) a step is executed against.
///
/// `Both` marks the synchronization barrier: neither session may pass
/// a `Both` step until the other has finished everything before it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepTarget {
    Publisher,
    Subscriber,
    Both,
}

impl StepTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
            Self::Both => "both",
        }
    }

    pub fn includes(&self, role: SessionRole) -> bool {
        match self {
            Self::Publisher => role == SessionRole::Publisher,
            Self::Subscriber => role == SessionRole::Subscriber,
            Self::Both => true,
        }
    }
}

/// Tagged step actions understood at the engine boundary.
///
/// New UI lookup or driving strategies are added as new variants (or as
/// parameters to `perform_action` on the session capability), never as
/// free-text interpreted inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Launch,
    Navigate { url: String },
    JoinChannel { channel_id: String },
    StartPublishing,
    StartSubscribing,
    WaitForMedia { description: String },
    PositionWindow { x: i32, y: i32, width: u32, height: u32 },
    AwaitVerification { instructions: String },
}

impl StepAction {
    /// Action class for circuit-breaker bookkeeping. Combined with the
    /// session role it forms the operation class, e.g.
    /// `publisher.join_channel`.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Navigate { .. } => "navigate",
            Self::JoinChannel { .. } => "join_channel",
            Self::StartPublishing => "publish",
            Self::StartSubscribing => "subscribe",
            Self::WaitForMedia { .. } => "wait_for_media",
            Self::PositionWindow { .. } => "position_window",
            Self::AwaitVerification { .. } => "await_verification",
        }
    }

    /// Session state a successful execution of this action leaves the
    /// session in, if the action advances the lifecycle at all.
    pub fn state_after(&self) -> Option<SessionState> {
        match self {
            Self::Launch => Some(SessionState::Launched),
            Self::Navigate { .. } => Some(SessionState::Navigated),
            Self::JoinChannel { .. } => Some(SessionState::ChannelJoined),
            Self::StartPublishing | Self::StartSubscribing => Some(SessionState::StreamActive),
            Self::WaitForMedia { .. } | Self::PositionWindow { .. } => None,
            Self::AwaitVerification { .. } => Some(SessionState::ReadyForVerification),
        }
    }

    pub fn is_verification(&self) -> bool {
        matches!(self, Self::AwaitVerification { .. })
    }
}

/// Declared expectation checked after the action call returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectedOutcome {
    /// The capability call returning without error is enough.
    #[default]
    ActionOk,
    /// The session must have reached the given lifecycle state.
    SessionStateIs { state: SessionState },
    /// The page must contain the given text.
    TextPresent { text: String },
}

/// Predicate deciding whether a fallback strategy applies to a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackCondition {
    Any,
    Category { category: FailureCategory },
    AnyOf { categories: Vec<FailureCategory> },
}

impl FallbackCondition {
    pub fn matches(&self, category: FailureCategory) -> bool {
        match self {
            Self::Any => true,
            Self::Category { category: c } => *c == category,
            Self::AnyOf { categories } => categories.contains(&category),
        }
    }
}

/// An alternative action to try after the primary action of a step has
/// exhausted its retries with a matching failure. Carries its own
/// timeout and attempt budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackStrategy {
    pub id: String,
    pub condition: FallbackCondition,
    pub action: StepAction,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl FallbackStrategy {
    pub fn new(id: impl Into<String>, condition: FallbackCondition, action: StepAction) -> Self {
        Self {
            id: id.into(),
            condition,
            action,
            params: Map::new(),
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            max_attempts: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One atomic step of an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub target: StepTarget,
    pub action: StepAction,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub expected: ExpectedOutcome,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides the engine-wide retry budget for this step only.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub fallbacks: Vec<FallbackStrategy>,
}

impl Step {
    pub fn new(id: impl Into<String>, target: StepTarget, action: StepAction) -> Self {
        Self {
            id: id.into(),
            target,
            action,
            params: Map::new(),
            expected: ExpectedOutcome::default(),
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            max_attempts: None,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_expected(mut self, expected: ExpectedOutcome) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_verification(&self) -> bool {
        self.action.is_verification()
    }
}

/// An ordered, immutable sequence of steps for one test run.
///
/// A plan is validated once before execution and never mutated by the
/// engine; plan adaptation means building a new plan so the original
/// stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<Step>,
}

impl ExecutionPlan {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
        }
    }

    /// Check the plan invariants: at least one step, unique step ids,
    /// unique fallback ids per step, non-zero timeouts, at most one
    /// verification step.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(CoreError::EmptyPlan);
        }

        let mut ids = HashSet::new();
        let mut verification_steps = 0usize;
        for step in &self.steps {
            if !ids.insert(step.id.as_str()) {
                return Err(CoreError::DuplicateStepId(step.id.clone()));
            }
            if step.timeout_ms == 0 {
                return Err(CoreError::ZeroTimeout {
                    step_id: step.id.clone(),
                });
            }
            if step.is_verification() {
                verification_steps += 1;
            }

            let mut fallback_ids = HashSet::new();
            for fallback in &step.fallbacks {
                if !fallback_ids.insert(fallback.id.as_str()) {
                    return Err(CoreError::DuplicateFallbackId {
                        step_id: step.id.clone(),
                        fallback_id: fallback.id.clone(),
                    });
                }
            }
        }

        if verification_steps > 1 {
            return Err(CoreError::MultipleVerificationSteps);
        }

        Ok(())
    }

    /// Index of the first step targeting both sessions, if any. Steps
    /// at or after this index must not start until both sessions have
    /// finished everything before it.
    pub fn barrier_position(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.target == StepTarget::Both)
    }

    pub fn verification_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.is_verification())
    }

    /// Plan indices and steps a given session executes on its own,
    /// in declared order. `Both` steps are excluded; they belong to
    /// the orchestrator.
    pub fn steps_for(&self, role: SessionRole) -> Vec<(usize, &Step)> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.target != StepTarget::Both && s.target.includes(role))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, target: StepTarget) -> Step {
        Step::new(id, target, StepAction::Launch)
    }

    #[test]
    fn test_empty_plan_invalid() {
        let plan = ExecutionPlan::new("empty", vec![]);
        assert!(matches!(plan.validate(), Err(CoreError::EmptyPlan)));
    }

    #[test]
    fn test_duplicate_step_ids_invalid() {
        let plan = ExecutionPlan::new(
            "dup",
            vec![
                step("launch", StepTarget::Publisher),
                step("launch", StepTarget::Subscriber),
            ],
        );
        assert!(matches!(
            plan.validate(),
            Err(CoreError::DuplicateStepId(id)) if id == "launch"
        ));
    }

    #[test]
    fn test_multiple_verification_steps_invalid() {
        let verify = |id: &str| {
            Step::new(
                id,
                StepTarget::Both,
                StepAction::AwaitVerification {
                    instructions: "listen".to_string(),
                },
            )
        };
        let plan = ExecutionPlan::new(
            "double-verify",
            vec![
                step("launch", StepTarget::Publisher),
                verify("v1"),
                verify("v2"),
            ],
        );
        assert!(matches!(
            plan.validate(),
            Err(CoreError::MultipleVerificationSteps)
        ));
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let mut bad = step("launch", StepTarget::Publisher);
        bad.timeout_ms = 0;
        let plan = ExecutionPlan::new("zero", vec![bad]);
        assert!(matches!(
            plan.validate(),
            Err(CoreError::ZeroTimeout { step_id }) if step_id == "launch"
        ));
    }

    #[test]
    fn test_steps_for_role_excludes_both() {
        let plan = ExecutionPlan::new(
            "split",
            vec![
                step("pub-launch", StepTarget::Publisher),
                step("sub-launch", StepTarget::Subscriber),
                Step::new(
                    "verify",
                    StepTarget::Both,
                    StepAction::AwaitVerification {
                        instructions: "listen".to_string(),
                    },
                ),
            ],
        );
        plan.validate().expect("plan should be valid");

        let publisher = plan.steps_for(SessionRole::Publisher);
        assert_eq!(publisher.len(), 1);
        assert_eq!(publisher[0].1.id, "pub-launch");
        assert_eq!(plan.barrier_position(), Some(2));
    }

    #[test]
    fn test_fallback_condition_matching() {
        assert!(FallbackCondition::Any.matches(FailureCategory::Timeout));
        assert!(FallbackCondition::Category {
            category: FailureCategory::ElementNotFound
        }
        .matches(FailureCategory::ElementNotFound));
        assert!(!FallbackCondition::Category {
            category: FailureCategory::ElementNotFound
        }
        .matches(FailureCategory::Timeout));
        assert!(FallbackCondition::AnyOf {
            categories: vec![FailureCategory::Timeout, FailureCategory::ElementNotFound]
        }
        .matches(FailureCategory::Timeout));
    }

    #[test]
    fn test_plan_serialization_round_trip() {
        let plan = ExecutionPlan::new(
            "serde",
            vec![Step::new(
                "navigate",
                StepTarget::Publisher,
                StepAction::Navigate {
                    url: "https://example.com/room".to_string(),
                },
            )
            .with_timeout(Duration::from_secs(10))],
        );

        let json = serde_json::to_string(&plan).unwrap();
        let parsed: ExecutionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.steps, plan.steps);
        assert_eq!(parsed.steps[0].timeout(), Duration::from_secs(10));
    }
}
