//! Client side of the inventory service: networks, clusters, nodes,
//! descriptors and instances.

use std::sync::Arc;

use async_trait::async_trait;
use common::api::{AppDescriptor, AppInstance, Cluster, Node};
use thiserror::Error;

pub mod memory;
pub mod rest;

pub use self::memory::InMemoryInventory;
pub use self::rest::HttpInventory;

pub type DynInventory = Arc<dyn Inventory>;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("inventory rejected {operation}: {message}")]
    Validation { operation: String, message: String },
    #[error("inventory conflict on {operation}: {message}")]
    Conflict { operation: String, message: String },
    #[error("inventory unreachable during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("inventory failed {operation}: status {status}, body: {body}")]
    Service {
        operation: String,
        status: u16,
        body: String,
    },
}

impl InventoryError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        InventoryError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::NotFound { .. })
    }
}

/// Semantic view of the inventory consumed by placement and the orchestrator.
///
/// Implementations report an absent entity as [`InventoryError::NotFound`] and
/// keep it distinct from transport failures.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn get_descriptor(
        &self,
        network_id: &str,
        descriptor_id: &str,
    ) -> Result<AppDescriptor, InventoryError>;

    /// Clusters of the network, ordered by cluster id.
    async fn list_clusters(&self, network_id: &str) -> Result<Vec<Cluster>, InventoryError>;

    async fn list_nodes(
        &self,
        network_id: &str,
        cluster_id: &str,
    ) -> Result<Vec<Node>, InventoryError>;

    async fn add_instance(&self, instance: AppInstance) -> Result<AppInstance, InventoryError>;

    async fn update_instance(&self, instance: AppInstance)
    -> Result<AppInstance, InventoryError>;

    async fn get_instance(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<AppInstance, InventoryError>;

    async fn list_instances(&self, network_id: &str) -> Result<Vec<AppInstance>, InventoryError>;

    async fn delete_instance(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<(), InventoryError>;
}
