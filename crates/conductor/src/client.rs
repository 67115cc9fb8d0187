//! Typed client of the conductor HTTP API.

use std::time::Duration;

use common::api::{AppInstance, DeployRequest, ErrorResponse, LogEntries, OperationResponse};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("conductor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("conductor returned status {status} ({kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },
}

impl ClientError {
    /// Error kind reported by the server, if any.
    pub fn kind(&self) -> Option<&str> {
        match self {
            ClientError::Api { kind, .. } => Some(kind),
            ClientError::Transport(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct ConductorClient {
    base_url: String,
    client: reqwest::Client,
}

impl ConductorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("conductor-client/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub async fn deploy(
        &self,
        network_id: &str,
        request: &DeployRequest,
    ) -> Result<AppInstance, ClientError> {
        let url = format!("{}/api/v0/app/{network_id}/deploy", self.base_url);
        self.send(self.client.post(url).json(request)).await
    }

    pub async fn undeploy(&self, network_id: &str, instance_id: &str) -> Result<(), ClientError> {
        let url = format!(
            "{}/api/v0/app/{network_id}/{instance_id}/undeploy",
            self.base_url
        );
        let _: OperationResponse = self.send(self.client.get(url)).await?;
        Ok(())
    }

    pub async fn logs(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<LogEntries, ClientError> {
        let url = format!("{}/api/v0/app/{network_id}/{instance_id}/logs", self.base_url);
        self.send(self.client.get(url)).await
    }

    pub async fn list(&self, network_id: &str) -> Result<Vec<AppInstance>, ClientError> {
        let url = format!("{}/api/v0/app/{network_id}/list", self.base_url);
        self.send(self.client.get(url)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let res = request.send().await?;
        if !res.status().is_success() {
            return Err(api_error(res).await);
        }
        Ok(res.json::<T>().await?)
    }
}

async fn api_error(res: Response) -> ClientError {
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => ClientError::Api {
            status,
            kind: err.kind,
            message: err.message,
        },
        Err(_) => ClientError::Api {
            status,
            kind: "unknown".into(),
            message: body,
        },
    }
}
