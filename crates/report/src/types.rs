use serde::{Deserialize, Serialize};

use interop_core::{OverallStatus, StepStatus, TestResult};

use crate::error::{ReportError, Result};

/// Connection settings for a TestRail-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Base URL of the instance, e.g. `https://example.testrail.io`.
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    /// Test run the results are attached to.
    pub run_id: u64,
    /// Case the interop scenario maps to.
    pub case_id: u64,
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ReportError::Config("base_url is empty".to_string()));
        }
        if self.username.is_empty() || self.api_key.is_empty() {
            return Err(ReportError::Config(
                "username and api_key are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Body of `add_result_for_case`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultPayload {
    pub status_id: u32,
    pub comment: String,
}

/// TestRail status IDs: 1 passed, 2 blocked, 4 retest, 5 failed.
pub fn status_id_for(overall: OverallStatus) -> u32 {
    match overall {
        OverallStatus::Pass => 1,
        OverallStatus::Aborted => 2,
        OverallStatus::Inconclusive => 4,
        OverallStatus::Fail => 5,
    }
}

impl ResultPayload {
    /// Render a sealed run into a submission payload. The comment is
    /// plain text: verdict first, then counts, then per-step failures.
    pub fn from_result(result: &TestResult) -> Self {
        let mut lines = Vec::new();
        lines.push(format!(
            "{} ({})",
            result.overall.as_str().to_uppercase(),
            result.plan_name
        ));

        if let Some(verdict) = &result.verdict {
            if !verdict.comment.is_empty() {
                lines.push(format!("Observer: {}", verdict.comment));
            }
        }

        lines.push(format!(
            "Steps: {} succeeded, {} failed, {} skipped; {} retries, {} fallbacks",
            result.succeeded_steps(),
            result.failed_steps(),
            result.skipped_steps(),
            result.retries,
            result.fallbacks_used,
        ));

        for outcome in &result.outcomes {
            if outcome.status != StepStatus::Failed {
                continue;
            }
            let category = outcome
                .error
                .map(|c| c.as_str())
                .unwrap_or("unknown");
            lines.push(format!(
                "- {} failed ({}) after {} attempt(s)",
                outcome.step_id,
                category,
                outcome.attempt_count(),
            ));
        }

        Self {
            status_id: status_id_for(result.overall),
            comment: lines.join("\n"),
        }
    }
}
