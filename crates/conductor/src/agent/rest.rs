use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::api::{AppDescriptor, DeployRequest};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{AgentError, AppList, ClusterAgent, ClusterAgentFactory, DynClusterAgent, StartCommand, args};
use crate::config::AgentConfig;

const APPS_PATH: &str = "/appmgr/apps";
const LIST_LIMIT: u32 = 100;
const STOP_TIMEOUT_SECS: u64 = 10;
const START_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of `POST /appmgr/apps`.
#[derive(Debug, Serialize)]
struct StartPayload<'a> {
    name: &'a str,
    namespace: &'a str,
    manifest: &'a str,
    version: &'a str,
    /// YAML values, base64 encoded as the agent expects raw bytes.
    rawvalue: String,
    labels: &'a HashMap<String, String>,
    timeout: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StopPayload {
    purge: bool,
    disable_hooks: bool,
    timeout: u64,
}

impl Default for StopPayload {
    fn default() -> Self {
        Self {
            purge: true,
            disable_hooks: true,
            timeout: STOP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StopResponse {
    #[serde(default)]
    stopped: bool,
}

#[derive(Debug, Deserialize)]
struct PodsResponse {
    #[serde(default)]
    pods: Vec<String>,
}

/// The pod listing takes the application name from the path; the body is empty.
#[derive(Debug, Default, Serialize)]
struct PodsPayload {}

#[derive(Debug, Serialize)]
struct ListPayload {
    limit: u32,
}

/// REST client of one cluster's application manager.
#[derive(Clone)]
pub struct HttpClusterAgent {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClusterAgent {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, AgentError> {
        let res = request.send().await.map_err(|err| {
            warn!(operation, base_url = %self.base_url, ?err, "cluster agent request failed");
            AgentError::Transport {
                operation,
                source: err.into(),
            }
        })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(operation, base_url = %self.base_url, %status, "cluster agent returned error");
            return Err(AgentError::Rejected {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, AgentError> {
        let res = self.execute(operation, request).await?;
        res.json::<T>()
            .await
            .map_err(|err| AgentError::InvalidResponse {
                operation,
                source: err.into(),
            })
    }
}

#[async_trait]
impl ClusterAgent for HttpClusterAgent {
    async fn start(
        &self,
        descriptor: &AppDescriptor,
        request: &DeployRequest,
    ) -> Result<(), AgentError> {
        let command = StartCommand::new(descriptor, request);
        let payload = StartPayload {
            name: &command.instance_name,
            namespace: "",
            manifest: &command.service_name,
            version: &command.service_version,
            rawvalue: STANDARD.encode(args::render_values(&command.arguments)),
            labels: &command.labels,
            timeout: START_TIMEOUT_SECS,
        };
        debug!(
            instance = %command.instance_name,
            manifest = %command.service_name,
            version = %command.service_version,
            "sending start request to cluster agent"
        );
        self.execute("start", self.client.post(self.url(APPS_PATH)).json(&payload))
            .await?;
        Ok(())
    }

    async fn stop(&self, instance_name: &str) -> Result<bool, AgentError> {
        let url = self.url(&format!("{APPS_PATH}/{instance_name}"));
        let res: StopResponse = self
            .fetch("stop", self.client.delete(url).json(&StopPayload::default()))
            .await?;
        Ok(res.stopped)
    }

    async fn pods(&self, instance_name: &str) -> Result<Vec<String>, AgentError> {
        let url = self.url(&format!("/appmgr/resources/pods/{instance_name}"));
        let res: PodsResponse = self
            .fetch("pods", self.client.get(url).json(&PodsPayload::default()))
            .await?;
        Ok(res.pods)
    }

    async fn list(&self) -> Result<AppList, AgentError> {
        self.fetch(
            "list",
            self.client
                .get(self.url(APPS_PATH))
                .json(&ListPayload { limit: LIST_LIMIT }),
        )
        .await
    }
}

/// Builds [`HttpClusterAgent`]s sharing one connection pool.
#[derive(Clone)]
pub struct HttpClusterAgentFactory {
    client: reqwest::Client,
    scheme: String,
}

impl HttpClusterAgentFactory {
    pub fn new(cfg: &AgentConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("conductor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT);
        if cfg.accept_invalid_certs {
            warn!("cluster agent TLS certificate verification is disabled; use only for development");
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            client: builder.build()?,
            scheme: cfg.scheme.clone(),
        })
    }
}

impl ClusterAgentFactory for HttpClusterAgentFactory {
    fn create(&self, host: &str, port: u16) -> Result<DynClusterAgent, AgentError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(AgentError::Unavailable {
                address: format!(":{port}"),
            });
        }
        let base_url = if host.contains(':') && !host.starts_with('[') {
            format!("{}://[{}]:{}", self.scheme, host, port)
        } else {
            format!("{}://{}:{}", self.scheme, host, port)
        };
        Ok(Arc::new(HttpClusterAgent::new(self.client.clone(), base_url)))
    }
}
