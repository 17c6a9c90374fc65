use std::time::Duration;

/// Circuit breaker tuning, shared by every operation class.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a class from closed to open.
    pub failure_threshold: u32,
    /// How long a tripped class rejects calls before allowing a probe.
    /// Fixed, no backoff growth; test runs are short-lived.
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(10),
            jitter: true,
        }
    }
}

/// Engine-wide retry budget; individual steps and fallback strategies
/// may override `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

/// Configuration for one execution engine instance.
///
/// Passed explicitly at construction rather than read from process
/// globals, so multiple engines can run in one process under test.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    /// Seed for retry jitter; declared so delays are reproducible.
    pub jitter_seed: u64,
    /// Grace given to an in-flight session call to unwind on
    /// cancellation before the session is force-closed.
    pub close_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            jitter_seed: 0,
            close_grace: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker.failure_threshold = threshold;
        self
    }

    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.breaker.open_duration = duration;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.retry.backoff = backoff;
        self
    }

    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = seed;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }
}
