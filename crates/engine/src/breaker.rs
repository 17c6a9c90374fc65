//! Per-operation-class circuit breaker.
//!
//! An operation class is `<role>.<action class>`, e.g.
//! `publisher.join_channel`. The breaker keeps a failure counter per
//! class and fails fast once a class looks systemically broken, so the
//! retry budget is not burned hammering a crashed browser.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, warn};

use events::{Event, EventBus};
use interop_core::{SessionRole, StepAction};

use crate::config::BreakerConfig;

/// Breaker state for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Decision for an incoming call on an operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Class is healthy, call proceeds.
    Allowed,
    /// Class is half-open; this call is the single trial.
    Probe,
    /// Class is open, fail fast without touching the session.
    Rejected,
}

#[derive(Debug)]
struct ClassState {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Default for ClassState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Operation class key for a step executed by a session.
pub fn operation_class(role: SessionRole, action: &StepAction) -> String {
    format!("{}.{}", role.as_str(), action.class())
}

/// Circuit breaker over all operation classes of one session.
///
/// Owned by a single step executor; classes never overlap across the
/// two sessions because the role is part of the key, so no cross-task
/// synchronization is needed.
pub struct CircuitBreaker {
    config: BreakerConfig,
    classes: HashMap<String, ClassState>,
    events: EventBus,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, events: EventBus) -> Self {
        Self {
            config,
            classes: HashMap::new(),
            events,
        }
    }

    /// Decide whether a call on `class` may proceed right now.
    ///
    /// An open class flips to half-open once the open duration has
    /// elapsed and then admits exactly one probe; concurrent calls in
    /// the same half-open window are rejected.
    pub fn admit(&mut self, class: &str) -> Admission {
        let open_duration = self.config.open_duration;
        let entry = self.classes.entry(class.to_string()).or_default();

        match entry.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                let elapsed = entry
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(open_duration);
                if elapsed >= open_duration {
                    entry.state = BreakerState::HalfOpen;
                    entry.probe_in_flight = true;
                    debug!(class, "Breaker half-open, admitting probe");
                    self.emit(class, BreakerState::Open, BreakerState::HalfOpen);
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen => {
                if entry.probe_in_flight {
                    Admission::Rejected
                } else {
                    entry.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Report a successful call on `class`.
    pub fn record_success(&mut self, class: &str) {
        let entry = self.classes.entry(class.to_string()).or_default();
        match entry.state {
            BreakerState::Closed => {
                entry.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                debug!(class, "Probe succeeded, breaker closed");
                entry.state = BreakerState::Closed;
                entry.consecutive_failures = 0;
                entry.opened_at = None;
                entry.probe_in_flight = false;
                self.emit(class, BreakerState::HalfOpen, BreakerState::Closed);
            }
            BreakerState::Open => {}
        }
    }

    /// Report a failed call on `class`. May trip the class open.
    pub fn record_failure(&mut self, class: &str) {
        let threshold = self.config.failure_threshold;
        let entry = self.classes.entry(class.to_string()).or_default();
        match entry.state {
            BreakerState::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= threshold {
                    warn!(
                        class,
                        failures = entry.consecutive_failures,
                        "Failure threshold reached, breaker open"
                    );
                    entry.state = BreakerState::Open;
                    entry.opened_at = Some(Instant::now());
                    self.emit(class, BreakerState::Closed, BreakerState::Open);
                }
            }
            BreakerState::HalfOpen => {
                warn!(class, "Probe failed, breaker re-opened");
                entry.state = BreakerState::Open;
                entry.opened_at = Some(Instant::now());
                entry.probe_in_flight = false;
                self.emit(class, BreakerState::HalfOpen, BreakerState::Open);
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self, class: &str) -> BreakerState {
        self.classes
            .get(class)
            .map(|c| c.state)
            .unwrap_or(BreakerState::Closed)
    }

    fn emit(&self, class: &str, from: BreakerState, to: BreakerState) {
        self.events.publish(Event::BreakerStateChanged {
            operation_class: class.to_string(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(threshold: u32, open: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig {
                failure_threshold: threshold,
                open_duration: open,
            },
            EventBus::new(),
        )
    }

    #[test]
    fn test_operation_class_key() {
        assert_eq!(
            operation_class(
                SessionRole::Publisher,
                &StepAction::JoinChannel {
                    channel_id: "room-1".to_string()
                }
            ),
            "publisher.join_channel"
        );
    }

    #[tokio::test]
    async fn test_trips_open_after_threshold() {
        let mut b = breaker(3, Duration::from_secs(30));
        let class = "publisher.join_channel";

        assert_eq!(b.admit(class), Admission::Allowed);
        b.record_failure(class);
        b.record_failure(class);
        assert_eq!(b.state(class), BreakerState::Closed);

        b.record_failure(class);
        assert_eq!(b.state(class), BreakerState::Open);
        assert_eq!(b.admit(class), Admission::Rejected);
    }

    #[tokio::test]
    async fn test_success_resets_counter_while_closed() {
        let mut b = breaker(3, Duration::from_secs(30));
        let class = "subscriber.navigate";

        b.record_failure(class);
        b.record_failure(class);
        b.record_success(class);
        b.record_failure(class);
        b.record_failure(class);
        assert_eq!(b.state(class), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let mut b = breaker(1, Duration::from_secs(30));
        let class = "publisher.publish";

        b.record_failure(class);
        assert_eq!(b.admit(class), Admission::Rejected);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(b.admit(class), Admission::Probe);
        // Second call in the same half-open window is rejected.
        assert_eq!(b.admit(class), Admission::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes_breaker() {
        let mut b = breaker(1, Duration::from_secs(10));
        let class = "publisher.publish";

        b.record_failure(class);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(b.admit(class), Admission::Probe);
        b.record_success(class);

        assert_eq!(b.state(class), BreakerState::Closed);
        assert_eq!(b.admit(class), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_with_fresh_timer() {
        let mut b = breaker(1, Duration::from_secs(10));
        let class = "publisher.publish";

        b.record_failure(class);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(b.admit(class), Admission::Probe);
        b.record_failure(class);

        assert_eq!(b.state(class), BreakerState::Open);
        // Timer restarted: still rejected before the full duration.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(b.admit(class), Admission::Rejected);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(b.admit(class), Admission::Probe);
    }

    #[tokio::test]
    async fn test_classes_are_independent() {
        let mut b = breaker(1, Duration::from_secs(30));
        b.record_failure("publisher.join_channel");

        assert_eq!(b.admit("publisher.join_channel"), Admission::Rejected);
        assert_eq!(b.admit("publisher.navigate"), Admission::Allowed);
    }
}
