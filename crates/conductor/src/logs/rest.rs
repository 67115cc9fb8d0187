use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{LogAggregator, LogAggregatorError, parser};
use crate::config::LogAggregatorConfig;

#[derive(Clone)]
pub struct HttpLogAggregator {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpLogAggregator {
    pub fn new(cfg: &LogAggregatorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("conductor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: cfg.address.trim_end_matches('/').to_string(),
            client,
            timeout: cfg.timeout(),
        })
    }
}

/// `pod:a and pod:b`
pub(crate) fn pod_query(pods: &[String]) -> String {
    pods.iter()
        .map(|pod| format!("pod:{pod}"))
        .collect::<Vec<_>>()
        .join(" and ")
}

#[async_trait]
impl LogAggregator for HttpLogAggregator {
    async fn logs(&self, pods: &[String]) -> Result<Vec<String>, LogAggregatorError> {
        let url = format!("{}/v1/log", self.base_url);
        let res = self
            .client
            .get(url)
            .query(&[("query", pod_query(pods))])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                warn!(?err, "log aggregator request failed");
                LogAggregatorError::Transport { source: err.into() }
            })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|err| LogAggregatorError::Transport { source: err.into() })?;
        if !status.is_success() {
            warn!(%status, "log aggregator returned error");
            return Err(LogAggregatorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        parser::parse_response(&body)
    }
}
