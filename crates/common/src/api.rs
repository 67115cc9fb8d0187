//! Inventory entities and conductor API payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Label carried by nodes that expose the cluster's public endpoint.
pub const MASTER_NODE_LABEL: &str = "master";

/// Logical tenant grouping of clusters, descriptors and instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Network identifier.
    pub id: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Administrative contact.
    #[serde(default)]
    pub admin_email: String,
}

/// Runtime environment class of a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    /// Cloud hosted cluster.
    Cloud,
    /// Gateway cluster between cloud and edge.
    Gateway,
    /// Edge cluster.
    Edge,
}

impl ClusterType {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Cloud => "cloud",
            ClusterType::Gateway => "gateway",
            ClusterType::Edge => "edge",
        }
    }
}

/// Installation state of a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// Registered but not installed yet.
    Created,
    /// Installed and able to run workloads.
    Installed,
    /// Workloads are being moved away.
    Draining,
    /// No workloads left.
    Drained,
    /// Installation failed.
    Failed,
}

impl ClusterStatus {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Created => "created",
            ClusterStatus::Installed => "installed",
            ClusterStatus::Draining => "draining",
            ClusterStatus::Drained => "drained",
            ClusterStatus::Failed => "failed",
        }
    }
}

/// Cluster as stored by the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Cluster identifier.
    pub id: String,
    /// Owning network.
    pub network_id: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Cluster class.
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    /// Installation state.
    pub status: ClusterStatus,
    /// Cluster is being drained.
    #[serde(default)]
    pub drain: bool,
    /// Cluster accepts no new workloads.
    #[serde(default)]
    pub cordon: bool,
}

impl Cluster {
    /// Installed clusters that are neither drained nor cordoned accept placements.
    pub fn is_eligible(&self) -> bool {
        self.status == ClusterStatus::Installed && !self.cordon && !self.drain
    }
}

/// Machine inside a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node identifier.
    pub id: String,
    /// Owning cluster.
    pub cluster_id: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form labels; `master` marks deployment targets.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Address the cluster agent is reachable on.
    #[serde(rename = "publicIP", default)]
    pub public_ip: String,
    /// Node state as reported by the inventory.
    #[serde(default)]
    pub status: String,
}

impl Node {
    /// Whether the node carries the `master` label (case-sensitive).
    pub fn is_master(&self) -> bool {
        self.labels.iter().any(|label| label == MASTER_NODE_LABEL)
    }
}

/// Port exposed by an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ApplicationPort {
    /// Port inside the workload.
    pub internal: u16,
    /// Port exposed outside the cluster.
    pub external: u16,
    /// Transport protocol, e.g. `tcp`.
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Template of something deployable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    /// Descriptor identifier.
    pub id: String,
    /// Owning network.
    pub network_id: String,
    /// Descriptor name.
    pub name: String,
    /// Package name understood by the cluster agent.
    pub service_name: String,
    /// Package version understood by the cluster agent.
    pub service_version: String,
    /// Cluster class the package targets.
    pub supported_cluster_type: ClusterType,
    /// Main service port.
    #[serde(default)]
    pub port: u16,
    /// Container images, in order.
    #[serde(default)]
    pub images: Vec<String>,
    /// Additional exposed ports copied into instances.
    #[serde(default)]
    pub ports: Vec<ApplicationPort>,
}

/// Storage class requested for an instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Cluster default storage.
    #[default]
    Default,
    /// Storage surviving workload restarts.
    Persistent,
    /// Storage dropped with the workload.
    Ephemeral,
}

/// Lifecycle state of an application instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Accepted, not placed yet.
    Queued,
    /// Reserved in the inventory while the cluster agent starts it.
    Deploying,
    /// Running on its cluster.
    Ready,
    /// Reported unhealthy.
    Error,
    /// Stopped on its cluster.
    Undeployed,
}

impl InstanceStatus {
    /// Returns the canonical lowercase representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Queued => "queued",
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Ready => "ready",
            InstanceStatus::Error => "error",
            InstanceStatus::Undeployed => "undeployed",
        }
    }

    /// Instances that still hold their name inside the network.
    pub fn is_live(&self) -> bool {
        !matches!(self, InstanceStatus::Undeployed)
    }
}

/// A placed deployment of a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppInstance {
    /// Instance identifier, assigned by the conductor.
    #[serde(rename = "deployedId", alias = "id")]
    pub id: String,
    /// Owning network.
    pub network_id: String,
    /// Descriptor this instance was built from.
    #[serde(rename = "appDescriptorId")]
    pub descriptor_id: String,
    /// Cluster hosting the instance.
    #[serde(default)]
    pub cluster_id: String,
    /// Instance name, unique among live instances of the network.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form label.
    #[serde(default)]
    pub label: String,
    /// Whitespace separated `key=value` arguments.
    #[serde(default)]
    pub arguments: String,
    /// Requested storage size.
    #[serde(rename = "persistentSize", default)]
    pub storage_bytes: String,
    /// Requested storage class.
    #[serde(default)]
    pub storage_type: StorageType,
    /// Exposed ports copied from the descriptor.
    #[serde(default)]
    pub ports: Vec<ApplicationPort>,
    /// Main service port copied from the descriptor.
    #[serde(default)]
    pub port: u16,
    /// Public address of the node the instance was sent to.
    #[serde(default)]
    pub cluster_address: String,
    /// Lifecycle state.
    pub status: InstanceStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/v0/app/{network_id}/deploy`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployRequest {
    /// Descriptor to deploy (required).
    #[serde(rename = "appDescriptorId")]
    pub descriptor_id: String,
    /// Instance name (required).
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Free-form label.
    pub label: String,
    /// Labels forwarded to the cluster agent.
    pub labels: HashMap<String, String>,
    /// Whitespace separated `key=value` arguments.
    pub arguments: String,
    /// Requested storage size.
    #[serde(rename = "persistentSize")]
    pub storage_bytes: String,
    /// Requested storage class.
    pub storage_type: StorageType,
}

/// Acknowledgement for operations without a payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct OperationResponse {
    /// Operation that completed, e.g. `undeploy`.
    pub operation: String,
}

impl OperationResponse {
    /// Builds an acknowledgement for `operation`.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

/// Log lines of an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct LogEntries {
    /// Lines as returned by the log aggregator.
    pub entries: Vec<String>,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorResponse {
    /// Machine readable error kind, e.g. `validation`.
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deploy_request_reads_wire_names_and_ignores_unknown_fields() {
        let req: DeployRequest = serde_json::from_value(json!({
            "appDescriptorId": "d1",
            "name": "app1",
            "persistentSize": "1Gi",
            "storageType": "persistent",
            "labels": {"team": "edge"},
            "somethingElse": true
        }))
        .expect("deserialize deploy request");

        assert_eq!(req.descriptor_id, "d1");
        assert_eq!(req.name, "app1");
        assert_eq!(req.storage_bytes, "1Gi");
        assert_eq!(req.storage_type, StorageType::Persistent);
        assert_eq!(req.labels.get("team").map(String::as_str), Some("edge"));
        assert!(req.arguments.is_empty());
    }

    #[test]
    fn instance_uses_camel_case_wire_format() {
        let instance = AppInstance {
            id: "i1".into(),
            network_id: "n1".into(),
            descriptor_id: "d1".into(),
            cluster_id: "c1".into(),
            name: "app1".into(),
            description: String::new(),
            label: String::new(),
            arguments: String::new(),
            storage_bytes: String::new(),
            storage_type: StorageType::Default,
            ports: vec![ApplicationPort {
                internal: 80,
                external: 30080,
                protocol: "tcp".into(),
            }],
            port: 80,
            cluster_address: "10.0.0.1".into(),
            status: InstanceStatus::Ready,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&instance).expect("serialize instance");
        assert_eq!(value["deployedId"], "i1");
        assert_eq!(value["appDescriptorId"], "d1");
        assert_eq!(value["clusterAddress"], "10.0.0.1");
        assert_eq!(value["status"], "ready");
        assert_eq!(value["storageType"], "default");
    }

    #[test]
    fn cluster_eligibility_requires_installed_and_uncordoned() {
        let mut cluster: Cluster = serde_json::from_value(json!({
            "id": "c1",
            "networkId": "n1",
            "type": "edge",
            "status": "installed"
        }))
        .expect("deserialize cluster");
        assert!(cluster.is_eligible());

        cluster.cordon = true;
        assert!(!cluster.is_eligible());

        cluster.cordon = false;
        cluster.drain = true;
        assert!(!cluster.is_eligible());

        cluster.drain = false;
        cluster.status = ClusterStatus::Created;
        assert!(!cluster.is_eligible());
    }

    #[test]
    fn master_label_is_case_sensitive() {
        let node: Node = serde_json::from_value(json!({
            "id": "node-1",
            "clusterId": "c1",
            "labels": ["Master", "worker"],
            "publicIP": "10.0.0.9"
        }))
        .expect("deserialize node");
        assert!(!node.is_master());
        assert_eq!(node.public_ip, "10.0.0.9");
    }
}
