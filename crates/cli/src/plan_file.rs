use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use engine::{EngineError, PlanSource};
use interop_core::ExecutionPlan;

pub async fn load(path: &Path) -> Result<ExecutionPlan> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    let plan: ExecutionPlan = serde_json::from_str(&content)
        .with_context(|| format!("invalid plan in {}", path.display()))?;
    Ok(plan)
}

pub fn to_json(plan: &ExecutionPlan) -> Result<String> {
    serde_json::to_string_pretty(plan).context("failed to serialize plan")
}

/// Plan source backed by a JSON file on disk.
pub struct FilePlanSource {
    path: PathBuf,
}

impl FilePlanSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PlanSource for FilePlanSource {
    async fn load(&self) -> engine::Result<ExecutionPlan> {
        load(&self.path)
            .await
            .map_err(|e| EngineError::collaborator(e.to_string()))
    }
}
