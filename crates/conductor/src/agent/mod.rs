//! Clients of the per-cluster application manager.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::api::{AppDescriptor, DeployRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod args;
pub mod rest;

pub use self::rest::{HttpClusterAgent, HttpClusterAgentFactory};

pub type DynClusterAgent = Arc<dyn ClusterAgent>;
pub type DynClusterAgentFactory = Arc<dyn ClusterAgentFactory>;

/// Label keys the conductor stamps on every workload it starts.
pub const NETWORK_ID_LABEL: &str = "networkID";
pub const CLUSTER_ID_LABEL: &str = "clusterID";
pub const DEPLOYED_ID_LABEL: &str = "deployedID";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no cluster agent available at {address}")]
    Unavailable { address: String },
    #[error("cluster agent {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("cluster agent {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("cluster agent rejected {operation}: status {status}, body: {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid cluster agent response to {operation}: {source}")]
    InvalidResponse {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// What the cluster agent needs to launch a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCommand {
    pub instance_name: String,
    pub service_name: String,
    pub service_version: String,
    pub arguments: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl StartCommand {
    pub fn new(descriptor: &AppDescriptor, request: &DeployRequest) -> Self {
        Self {
            instance_name: request.name.clone(),
            service_name: descriptor.service_name.clone(),
            service_version: descriptor.service_version.clone(),
            arguments: split_arguments(&request.arguments),
            labels: request.labels.clone(),
        }
    }
}

/// Splits the free-form argument string; an empty string yields no arguments.
pub fn split_arguments(arguments: &str) -> Vec<String> {
    arguments.split_whitespace().map(str::to_string).collect()
}

/// Application reported by a cluster agent listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppSummary {
    pub name: String,
    pub application: String,
    pub version: String,
    pub updated: String,
    pub status: String,
    pub revision: i32,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub services: Vec<serde_json::Value>,
}

impl AppSummary {
    /// Whether the workload was started by the conductor for this instance.
    pub fn belongs_to(&self, network_id: &str, instance_id: &str) -> bool {
        self.labels.get(NETWORK_ID_LABEL).map(String::as_str) == Some(network_id)
            && self.labels.get(DEPLOYED_ID_LABEL).map(String::as_str) == Some(instance_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppList {
    pub count: i64,
    pub next: String,
    pub total: i64,
    pub applications: Vec<AppSummary>,
}

#[async_trait]
pub trait ClusterAgent: Send + Sync {
    async fn start(
        &self,
        descriptor: &AppDescriptor,
        request: &DeployRequest,
    ) -> Result<(), AgentError>;

    /// Returns whether the workload was actually removed.
    async fn stop(&self, instance_name: &str) -> Result<bool, AgentError>;

    async fn pods(&self, instance_name: &str) -> Result<Vec<String>, AgentError>;

    async fn list(&self) -> Result<AppList, AgentError>;
}

/// Produces a short-lived client for one cluster.
///
/// Returning no client is an error, never a silent no-op.
pub trait ClusterAgentFactory: Send + Sync {
    fn create(&self, host: &str, port: u16) -> Result<DynClusterAgent, AgentError>;
}
