use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use engine::{Backoff, EngineConfig};
use report::ReportConfig;

pub const DEFAULT_CONFIG_FILE: &str = "interop.toml";

/// Runner configuration, read from a TOML file next to the plan.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub engine: EngineSection,
    pub plan: PlanSection,
    /// Optional result publishing; runs work without it.
    pub report: Option<ReportSection>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_attempts: u32,
    pub failure_threshold: u32,
    pub open_duration_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_seed: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_threshold: 3,
            open_duration_secs: 30,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            jitter_seed: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSection {
    pub url: String,
    pub channel: String,
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            url: "https://meet.example.com".to_string(),
            channel: "interop-check".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportSection {
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    pub run_id: u64,
    pub case_id: u64,
}

impl RunnerConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Load from `path` when given, otherwise from `interop.toml` if it
    /// exists, otherwise defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default).await
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_max_attempts(self.engine.max_attempts)
            .with_failure_threshold(self.engine.failure_threshold)
            .with_open_duration(Duration::from_secs(self.engine.open_duration_secs))
            .with_backoff(Backoff::Exponential {
                base: Duration::from_millis(self.engine.backoff_base_ms),
                max: Duration::from_millis(self.engine.backoff_max_ms),
                jitter: true,
            })
            .with_jitter_seed(self.engine.jitter_seed)
    }

    pub fn report_config(&self) -> Option<ReportConfig> {
        self.report.as_ref().map(|r| ReportConfig {
            base_url: r.base_url.clone(),
            username: r.username.clone(),
            api_key: r.api_key.clone(),
            run_id: r.run_id,
            case_id: r.case_id,
        })
    }
}
