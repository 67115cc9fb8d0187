//! Log aggregator client.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod parser;
pub mod rest;

pub use self::rest::HttpLogAggregator;

pub type DynLogAggregator = Arc<dyn LogAggregator>;

#[derive(Debug, Error)]
pub enum LogAggregatorError {
    #[error("log aggregator request failed: {source}")]
    Transport {
        #[source]
        source: anyhow::Error,
    },
    #[error("log aggregator returned status {status}, body: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid log aggregator response: {0}")]
    InvalidResponse(String),
}

/// Returns the log lines of the given pods. Lines are passed through as the
/// aggregator orders them.
#[async_trait]
pub trait LogAggregator: Send + Sync {
    async fn logs(&self, pods: &[String]) -> Result<Vec<String>, LogAggregatorError>;
}
