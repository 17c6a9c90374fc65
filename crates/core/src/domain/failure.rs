use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure taxonomy used by the retry policy, circuit breaker and
/// fallback selection. Every failed attempt is classified into exactly
/// one of these categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    ElementNotFound,
    SessionCrashed,
    AssertionMismatch,
    CircuitOpen,
    Cancelled,
    InvalidPlan,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ElementNotFound => "element_not_found",
            Self::SessionCrashed => "session_crashed",
            Self::AssertionMismatch => "assertion_mismatch",
            Self::CircuitOpen => "circuit_open",
            Self::Cancelled => "cancelled",
            Self::InvalidPlan => "invalid_plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Self::Timeout),
            "element_not_found" => Some(Self::ElementNotFound),
            "session_crashed" => Some(Self::SessionCrashed),
            "assertion_mismatch" => Some(Self::AssertionMismatch),
            "circuit_open" => Some(Self::CircuitOpen),
            "cancelled" => Some(Self::Cancelled),
            "invalid_plan" => Some(Self::InvalidPlan),
            _ => None,
        }
    }

    /// Whether an attempt failing with this category may be retried.
    ///
    /// A crashed session cannot recover by repeating the same call, an
    /// open breaker already decided to fail fast, and cancellation and
    /// plan validation failures are terminal by definition.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::SessionCrashed | Self::CircuitOpen | Self::Cancelled | Self::InvalidPlan
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorized failure raised by a session capability call or by
/// outcome assertion inside the step executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{category}: {message}")]
pub struct StepFailure {
    pub category: FailureCategory,
    pub message: String,
}

impl StepFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Timeout, message)
    }

    pub fn element_not_found(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::ElementNotFound, message)
    }

    pub fn session_crashed(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::SessionCrashed, message)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureCategory::Cancelled, "execution cancelled")
    }
}
