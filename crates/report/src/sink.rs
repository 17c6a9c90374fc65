use async_trait::async_trait;
use tracing::info;

use engine::{EngineError, ResultSink};
use interop_core::TestResult;

use crate::client::TestRailClient;
use crate::error::Result;
use crate::types::{ReportConfig, ResultPayload};

/// Publishes sealed run results to a TestRail-compatible endpoint.
pub struct TestRailSink {
    client: TestRailClient,
}

impl TestRailSink {
    pub fn new(config: ReportConfig) -> Result<Self> {
        Ok(Self {
            client: TestRailClient::new(config)?,
        })
    }
}

#[async_trait]
impl ResultSink for TestRailSink {
    async fn submit(&self, result: &TestResult) -> engine::Result<()> {
        let payload = ResultPayload::from_result(result);
        info!(
            run_id = %result.run_id,
            overall = %result.overall.as_str(),
            "Publishing run result"
        );
        self.client
            .add_result_for_case(&payload)
            .await
            .map_err(|e| EngineError::collaborator(e.to_string()))
    }
}
