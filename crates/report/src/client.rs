use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::{ReportError, Result};
use crate::types::{ReportConfig, ResultPayload};

/// Minimal TestRail API v2 client; only the calls the runner needs.
pub struct TestRailClient {
    http: reqwest::Client,
    config: ReportConfig,
}

impl TestRailClient {
    pub fn new(config: ReportConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ReportError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// `POST index.php?/api/v2/add_result_for_case/{run_id}/{case_id}`
    pub async fn add_result_for_case(&self, payload: &ResultPayload) -> Result<()> {
        let url = format!(
            "{}/index.php?/api/v2/add_result_for_case/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.run_id,
            self.config.case_id,
        );
        debug!(run_id = self.config.run_id, case_id = self.config.case_id, "Submitting result");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .json(payload)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(
                    run_id = self.config.run_id,
                    case_id = self.config.case_id,
                    status_id = payload.status_id,
                    "Result submitted"
                );
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ReportError::Authentication("credentials rejected".to_string()),
            ),
            StatusCode::NOT_FOUND => Err(ReportError::CaseNotFound {
                case_id: self.config.case_id,
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(ReportError::RateLimitExceeded),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ReportError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
