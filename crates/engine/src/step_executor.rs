//! Single-step execution with retries, circuit breaking and fallbacks.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use events::{Event, EventBus};
use interop_core::{
    AttemptRecord, EvidenceRef, ExpectedOutcome, FailureCategory, SessionRole, Step, StepAction,
    StepFailure, StepOutcome, StepStatus,
};

use crate::breaker::{operation_class, Admission, BreakerState, CircuitBreaker};
use crate::config::EngineConfig;
use crate::fallback::FallbackSelector;
use crate::retry::RetryPolicy;
use crate::session::Session;

/// The action, parameters and budget currently being attempted for a
/// step: the primary action first, then fallback strategies in order.
struct ActiveStrategy<'a> {
    action: &'a StepAction,
    params: &'a Map<String, Value>,
    timeout: Duration,
    policy: RetryPolicy,
    fallback_id: Option<String>,
}

/// Runs steps for one session, applying the circuit breaker, the
/// retry policy and fallback selection.
///
/// An executor is bound to one session role; operation classes are
/// keyed by role, so the breaker state is owned here and never shared
/// across tasks. `execute` never returns an error: every step ends in
/// a [`StepOutcome`] carrying the full attempt history.
pub struct StepExecutor {
    role: SessionRole,
    breaker: CircuitBreaker,
    default_policy: RetryPolicy,
    events: EventBus,
    cancel: CancellationToken,
}

impl StepExecutor {
    pub fn new(
        role: SessionRole,
        config: &EngineConfig,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            role,
            breaker: CircuitBreaker::new(config.breaker.clone(), events.clone()),
            default_policy: RetryPolicy::new(&config.retry, config.jitter_seed),
            events,
            cancel,
        }
    }

    pub async fn execute(&mut self, step: &Step, session: &mut Session) -> StepOutcome {
        let class = operation_class(self.role, &step.action);
        let started = Instant::now();

        self.events.publish(Event::StepStarted {
            step_id: step.id.clone(),
            role: self.role,
            action_class: step.action.class().to_string(),
        });

        if self.breaker.admit(&class) == Admission::Rejected {
            debug!(
                step_id = %step.id,
                operation_class = %class,
                "Breaker open, rejecting step without execution"
            );
            return self.finish(step, started, Vec::new(), StepStatus::Failed, None, Some(FailureCategory::CircuitOpen));
        }

        let mut current = ActiveStrategy {
            action: &step.action,
            params: &step.params,
            timeout: step.timeout(),
            policy: self.policy_with_budget(step.max_attempts),
            fallback_id: None,
        };

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_category: Option<FailureCategory> = None;

        'strategies: loop {
            let mut strategy_attempt = 0u32;
            'attempts: loop {
                strategy_attempt += 1;
                if self.cancel.is_cancelled() {
                    return self.finish_cancelled(step, started, attempts, &current);
                }

                let attempt_no = attempts.len() as u32 + 1;
                let attempt_started = Instant::now();

                let result = tokio::select! {
                    _ = self.cancel.cancelled() => Err(StepFailure::cancelled()),
                    r = tokio::time::timeout(
                        current.timeout,
                        Self::attempt(session, current.action, current.params, current.timeout, &step.expected),
                    ) => match r {
                        Ok(inner) => inner,
                        Err(_) => Err(StepFailure::timeout(format!(
                            "step {} exceeded {}ms",
                            step.id,
                            current.timeout.as_millis()
                        ))),
                    },
                };

                let evidence = session.capture_evidence(&step.id, attempt_no).await;
                let elapsed = attempt_started.elapsed().as_millis() as u64;

                match result {
                    Ok(()) => {
                        self.breaker.record_success(&class);
                        attempts.push(Self::record(attempt_no, &current, elapsed, evidence, None));
                        let fallback = current.fallback_id.clone();
                        return self.finish(
                            step,
                            started,
                            attempts,
                            StepStatus::Succeeded,
                            fallback,
                            None,
                        );
                    }
                    Err(failure) => {
                        last_category = Some(failure.category);
                        attempts.push(Self::record(
                            attempt_no,
                            &current,
                            elapsed,
                            evidence,
                            Some(&failure),
                        ));
                        self.events.publish(Event::StepAttemptFailed {
                            step_id: step.id.clone(),
                            role: self.role,
                            attempt: attempt_no,
                            category: failure.category,
                        });

                        if failure.category == FailureCategory::Cancelled {
                            return self.finish(
                                step,
                                started,
                                attempts,
                                StepStatus::Failed,
                                None,
                                Some(FailureCategory::Cancelled),
                            );
                        }

                        self.breaker.record_failure(&class);

                        if failure.category == FailureCategory::SessionCrashed {
                            warn!(
                                step_id = %step.id,
                                role = %self.role.as_str(),
                                "Session crashed, disqualifying remaining attempts"
                            );
                            session.mark_failed();
                            break 'strategies;
                        }

                        // The class may have tripped while this step was
                        // retrying; stop hammering it and move on to
                        // fallback selection with the real category.
                        if self.breaker.state(&class) == BreakerState::Open {
                            break 'attempts;
                        }

                        if current.policy.should_retry(strategy_attempt, failure.category) {
                            let delay = current.policy.delay_for(strategy_attempt);
                            debug!(
                                step_id = %step.id,
                                attempt = attempt_no,
                                delay_ms = delay.as_millis() as u64,
                                "Retrying after backoff"
                            );
                            tokio::select! {
                                _ = self.cancel.cancelled() => {
                                    return self.finish_cancelled(step, started, attempts, &current);
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                            continue 'attempts;
                        }
                        break 'attempts;
                    }
                }
            }

            let Some(category) = last_category else {
                break 'strategies;
            };
            match FallbackSelector::next_strategy(step, &tried, category) {
                Some(strategy) => {
                    tried.insert(strategy.id.clone());
                    self.events.publish(Event::FallbackEngaged {
                        step_id: step.id.clone(),
                        role: self.role,
                        strategy_id: strategy.id.clone(),
                    });
                    current = ActiveStrategy {
                        action: &strategy.action,
                        params: &strategy.params,
                        timeout: strategy.timeout(),
                        policy: self.policy_with_budget(strategy.max_attempts),
                        fallback_id: Some(strategy.id.clone()),
                    };
                    continue 'strategies;
                }
                None => break 'strategies,
            }
        }

        self.finish(step, started, attempts, StepStatus::Failed, None, last_category)
    }

    /// One attempt: run the action, advance the session lifecycle,
    /// check the declared expectation.
    async fn attempt(
        session: &mut Session,
        action: &StepAction,
        params: &Map<String, Value>,
        timeout: Duration,
        expected: &ExpectedOutcome,
    ) -> std::result::Result<(), StepFailure> {
        match action {
            StepAction::Navigate { url } => session.capability().navigate(url).await?,
            StepAction::WaitForMedia { description } => {
                let met = session
                    .capability()
                    .wait_for_state(description, timeout)
                    .await?;
                if !met {
                    return Err(StepFailure::timeout(format!(
                        "condition not met: {description}"
                    )));
                }
            }
            other => {
                session.capability().perform_action(other, params).await?;
            }
        }

        session
            .advance(action)
            .map_err(|e| StepFailure::new(FailureCategory::AssertionMismatch, e.to_string()))?;

        match expected {
            ExpectedOutcome::ActionOk => Ok(()),
            ExpectedOutcome::SessionStateIs { state } => {
                if session.state() == *state {
                    Ok(())
                } else {
                    Err(StepFailure::new(
                        FailureCategory::AssertionMismatch,
                        format!(
                            "expected session state {}, found {}",
                            state.as_str(),
                            session.state().as_str()
                        ),
                    ))
                }
            }
            ExpectedOutcome::TextPresent { text } => {
                let present = session
                    .capability()
                    .wait_for_state(&format!("text present: {text}"), timeout)
                    .await?;
                if present {
                    Ok(())
                } else {
                    Err(StepFailure::new(
                        FailureCategory::AssertionMismatch,
                        format!("text not present: {text}"),
                    ))
                }
            }
        }
    }

    fn policy_with_budget(&self, max_attempts: Option<u32>) -> RetryPolicy {
        match max_attempts {
            Some(n) => self.default_policy.with_max_attempts(n),
            None => self.default_policy.clone(),
        }
    }

    fn record(
        attempt: u32,
        current: &ActiveStrategy<'_>,
        elapsed_ms: u64,
        evidence: Option<EvidenceRef>,
        failure: Option<&StepFailure>,
    ) -> AttemptRecord {
        AttemptRecord {
            attempt,
            action_class: current.action.class().to_string(),
            fallback_id: current.fallback_id.clone(),
            elapsed_ms,
            evidence,
            error: failure.map(|f| f.category),
            error_message: failure.map(|f| f.message.clone()),
        }
    }

    fn finish_cancelled(
        &self,
        step: &Step,
        started: Instant,
        attempts: Vec<AttemptRecord>,
        _current: &ActiveStrategy<'_>,
    ) -> StepOutcome {
        if attempts.is_empty() {
            let outcome = StepOutcome::skipped(step.id.clone(), Some(self.role));
            self.emit_finished(&outcome);
            return outcome;
        }
        self.finish(
            step,
            started,
            attempts,
            StepStatus::Failed,
            None,
            Some(FailureCategory::Cancelled),
        )
    }

    fn finish(
        &self,
        step: &Step,
        started: Instant,
        attempts: Vec<AttemptRecord>,
        status: StepStatus,
        fallback_used: Option<String>,
        error: Option<FailureCategory>,
    ) -> StepOutcome {
        let outcome = StepOutcome {
            step_id: step.id.clone(),
            role: Some(self.role),
            status,
            attempts,
            elapsed_ms: started.elapsed().as_millis() as u64,
            fallback_used,
            error,
        };
        self.emit_finished(&outcome);
        outcome
    }

    fn emit_finished(&self, outcome: &StepOutcome) {
        self.events.publish(Event::StepFinished {
            step_id: outcome.step_id.clone(),
            role: self.role,
            status: outcome.status,
            attempts: outcome.attempt_count(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interop_core::{FallbackCondition, FallbackStrategy, SessionState, StepTarget};
    use std::collections::VecDeque;

    /// Capability whose action results are scripted per action class.
    struct ScriptedCapability {
        script: VecDeque<std::result::Result<(), StepFailure>>,
        calls: u32,
    }

    impl ScriptedCapability {
        fn new(script: Vec<std::result::Result<(), StepFailure>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }

        fn next(&mut self) -> std::result::Result<(), StepFailure> {
            self.calls += 1;
            self.script.pop_front().unwrap_or(Ok(()))
        }
    }

    #[async_trait]
    impl crate::session::SessionCapability for ScriptedCapability {
        async fn navigate(&mut self, _url: &str) -> std::result::Result<(), StepFailure> {
            self.next()
        }

        async fn perform_action(
            &mut self,
            _action: &StepAction,
            _params: &Map<String, Value>,
        ) -> std::result::Result<Value, StepFailure> {
            self.next().map(|_| Value::Null)
        }

        async fn wait_for_state(
            &mut self,
            _description: &str,
            _timeout: Duration,
        ) -> std::result::Result<bool, StepFailure> {
            self.next().map(|_| true)
        }

        async fn capture_evidence(&mut self) -> std::result::Result<String, StepFailure> {
            Ok(format!("shot-{}", self.calls))
        }

        async fn close(&mut self) -> std::result::Result<(), StepFailure> {
            Ok(())
        }
    }

    fn executor(config: EngineConfig) -> StepExecutor {
        StepExecutor::new(
            SessionRole::Publisher,
            &config,
            EventBus::new(),
            CancellationToken::new(),
        )
    }

    fn session_with(script: Vec<std::result::Result<(), StepFailure>>) -> Session {
        Session::new(
            SessionRole::Publisher,
            Box::new(ScriptedCapability::new(script)),
            EventBus::new(),
        )
    }

    fn fast_config() -> EngineConfig {
        EngineConfig::new().with_backoff(crate::config::Backoff::Fixed(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let mut exec = executor(fast_config());
        let mut session = session_with(vec![Ok(())]);
        let step = Step::new("launch", StepTarget::Publisher, StepAction::Launch);

        let outcome = exec.execute(&step, &mut session).await;

        assert_eq!(outcome.status, StepStatus::Succeeded);
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(session.state(), SessionState::Launched);
        assert!(outcome.attempts[0].evidence.is_some());
        session.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_permanent_failure_records_all_attempts() {
        let mut exec = executor(fast_config());
        let mut session = session_with(vec![
            Err(StepFailure::timeout("slow")),
            Err(StepFailure::timeout("slow")),
            Err(StepFailure::timeout("slow")),
        ]);
        let step =
            Step::new("launch", StepTarget::Publisher, StepAction::Launch).with_max_attempts(3);

        let outcome = exec.execute(&step, &mut session).await;

        assert_eq!(outcome.status, StepStatus::Failed);
        assert_eq!(outcome.attempt_count(), 3);
        assert_eq!(outcome.error, Some(FailureCategory::Timeout));
        session.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_fallback_succeeds_after_primary_failure() {
        let mut exec = executor(fast_config());
        let mut session = session_with(vec![
            Err(StepFailure::element_not_found("publish button missing")),
            Ok(()),
        ]);
        let step = Step::new("launch", StepTarget::Publisher, StepAction::Launch)
            .with_max_attempts(1)
            .with_fallback(
                FallbackStrategy::new(
                    "launch-retry-profile",
                    FallbackCondition::Category {
                        category: FailureCategory::ElementNotFound,
                    },
                    StepAction::Launch,
                )
                .with_max_attempts(1),
            );

        let outcome = exec.execute(&step, &mut session).await;

        assert_eq!(outcome.status, StepStatus::Succeeded);
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(
            outcome.fallback_used.as_deref(),
            Some("launch-retry-profile")
        );
        assert_eq!(
            outcome.attempts[1].fallback_id.as_deref(),
            Some("launch-retry-profile")
        );
        session.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_touching_session() {
        let config = fast_config().with_failure_threshold(1).with_max_attempts(1);
        let mut exec = executor(config);

        let mut session = session_with(vec![Err(StepFailure::timeout("down"))]);
        let step = Step::new("launch-1", StepTarget::Publisher, StepAction::Launch);
        let first = exec.execute(&step, &mut session).await;
        assert_eq!(first.status, StepStatus::Failed);

        // Same operation class, breaker now open: no attempt consumed.
        let mut untouched = session_with(vec![Ok(())]);
        let step2 = Step::new("launch-2", StepTarget::Publisher, StepAction::Launch);
        let second = exec.execute(&step2, &mut untouched).await;

        assert_eq!(second.status, StepStatus::Failed);
        assert_eq!(second.error, Some(FailureCategory::CircuitOpen));
        assert_eq!(second.attempt_count(), 0);
        session.close(Duration::from_millis(10)).await;
        untouched.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_session_crash_skips_retries_and_fallbacks() {
        let mut exec = executor(fast_config());
        let mut session = session_with(vec![Err(StepFailure::session_crashed("gone"))]);
        let step = Step::new("launch", StepTarget::Publisher, StepAction::Launch)
            .with_max_attempts(3)
            .with_fallback(FallbackStrategy::new(
                "relaunch",
                FallbackCondition::Any,
                StepAction::Launch,
            ));

        let outcome = exec.execute(&step, &mut session).await;

        assert_eq!(outcome.status, StepStatus::Failed);
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(outcome.error, Some(FailureCategory::SessionCrashed));
        assert_eq!(session.state(), SessionState::Failed);
        session.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_cancellation_before_first_attempt_skips_step() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut exec = StepExecutor::new(
            SessionRole::Publisher,
            &fast_config(),
            EventBus::new(),
            cancel,
        );
        let mut session = session_with(vec![Ok(())]);
        let step = Step::new("launch", StepTarget::Publisher, StepAction::Launch);

        let outcome = exec.execute(&step, &mut session).await;

        assert_eq!(outcome.status, StepStatus::Skipped);
        assert_eq!(outcome.attempt_count(), 0);
        session.close(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_assertion_mismatch_is_retryable() {
        let mut exec = executor(fast_config());
        // Action call succeeds each time; the expectation decides.
        let mut session = session_with(vec![Ok(()), Ok(())]);
        let step = Step::new("launch", StepTarget::Publisher, StepAction::Launch)
            .with_max_attempts(2)
            .with_expected(ExpectedOutcome::SessionStateIs {
                state: SessionState::Launched,
            });

        let outcome = exec.execute(&step, &mut session).await;
        // First attempt already moves the session to Launched, so the
        // expectation holds immediately.
        assert_eq!(outcome.status, StepStatus::Succeeded);
        assert_eq!(outcome.attempt_count(), 1);
        session.close(Duration::from_millis(10)).await;
    }
}
