//! Result publishing to an external test management system.

pub mod client;
pub mod error;
pub mod sink;
pub mod types;

pub use client::TestRailClient;
pub use error::{ReportError, Result};
pub use sink::TestRailSink;
pub use types::{status_id_for, ReportConfig, ResultPayload};
