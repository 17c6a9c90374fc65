//! Simulated browser session for dry runs and demos.
//!
//! Actions succeed after a short artificial delay; a configurable
//! flake rate injects categorized failures so retry and fallback
//! behavior can be watched without real browsers.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use tracing::debug;

use engine::SessionCapability;
use interop_core::{SessionRole, StepAction, StepFailure};

pub struct SimulatedSession {
    role: SessionRole,
    latency: Duration,
    flake_rate: f64,
    rng: StdRng,
    screenshots: u32,
}

impl SimulatedSession {
    pub fn new(role: SessionRole) -> Self {
        Self {
            role,
            latency: Duration::from_millis(150),
            flake_rate: 0.0,
            rng: StdRng::seed_from_u64(role as u64),
            screenshots: 0,
        }
    }

    /// Probability in `[0, 1]` that any action call fails with a
    /// retryable failure.
    pub fn with_flake_rate(mut self, rate: f64, seed: u64) -> Self {
        self.flake_rate = rate.clamp(0.0, 1.0);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn simulate(&mut self, what: &str) -> Result<(), StepFailure> {
        tokio::time::sleep(self.latency).await;
        if self.flake_rate > 0.0 && self.rng.gen_bool(self.flake_rate) {
            debug!(role = %self.role.as_str(), what, "Injected flake");
            return Err(StepFailure::element_not_found(format!(
                "simulated flake during {what}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionCapability for SimulatedSession {
    async fn navigate(&mut self, url: &str) -> Result<(), StepFailure> {
        self.simulate(&format!("navigate to {url}")).await
    }

    async fn perform_action(
        &mut self,
        action: &StepAction,
        _params: &Map<String, Value>,
    ) -> Result<Value, StepFailure> {
        self.simulate(action.class()).await?;
        Ok(Value::Null)
    }

    async fn wait_for_state(
        &mut self,
        description: &str,
        _timeout: Duration,
    ) -> Result<bool, StepFailure> {
        self.simulate(description).await?;
        Ok(true)
    }

    async fn capture_evidence(&mut self) -> Result<String, StepFailure> {
        self.screenshots += 1;
        Ok(format!(
            "sim://{}/screenshot/{}",
            self.role.as_str(),
            self.screenshots
        ))
    }

    async fn close(&mut self) -> Result<(), StepFailure> {
        tokio::time::sleep(self.latency / 2).await;
        Ok(())
    }
}
