use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Case not found: {case_id}")]
    CaseNotFound { case_id: u64 },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        ReportError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
