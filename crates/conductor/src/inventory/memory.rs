use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use common::api::{AppDescriptor, AppInstance, Cluster, Node};
use tokio::sync::Mutex;

use super::{Inventory, InventoryError};

/// Inventory operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryOperation {
    GetDescriptor,
    ListClusters,
    ListNodes,
    AddInstance,
    UpdateInstance,
    GetInstance,
    ListInstances,
    DeleteInstance,
}

impl InventoryOperation {
    fn as_str(&self) -> &'static str {
        match self {
            InventoryOperation::GetDescriptor => "get_descriptor",
            InventoryOperation::ListClusters => "list_clusters",
            InventoryOperation::ListNodes => "list_nodes",
            InventoryOperation::AddInstance => "add_instance",
            InventoryOperation::UpdateInstance => "update_instance",
            InventoryOperation::GetInstance => "get_instance",
            InventoryOperation::ListInstances => "list_instances",
            InventoryOperation::DeleteInstance => "delete_instance",
        }
    }
}

#[derive(Default)]
struct Store {
    networks: HashSet<String>,
    clusters: HashMap<String, BTreeMap<String, Cluster>>,
    nodes: HashMap<(String, String), Vec<Node>>,
    descriptors: HashMap<(String, String), AppDescriptor>,
    instances: HashMap<String, BTreeMap<String, AppInstance>>,
    failing: HashSet<InventoryOperation>,
    writes: usize,
}

impl Store {
    fn check(&self, op: InventoryOperation) -> Result<(), InventoryError> {
        if self.failing.contains(&op) {
            return Err(InventoryError::Service {
                operation: op.as_str().to_string(),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn network(&self, network_id: &str) -> Result<(), InventoryError> {
        if self.networks.contains(network_id) {
            Ok(())
        } else {
            Err(InventoryError::not_found(format!("network {network_id}")))
        }
    }
}

/// Process-local inventory for tests and local development.
#[derive(Clone, Default)]
pub struct InMemoryInventory {
    store: Arc<Mutex<Store>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_network(&self, network_id: &str) {
        self.store.lock().await.networks.insert(network_id.to_string());
    }

    /// Drops the network and everything it contains.
    pub async fn remove_network(&self, network_id: &str) {
        let mut store = self.store.lock().await;
        store.networks.remove(network_id);
        store.clusters.remove(network_id);
        store.instances.remove(network_id);
        store.nodes.retain(|(net, _), _| net != network_id);
        store.descriptors.retain(|(net, _), _| net != network_id);
    }

    /// Inserts or replaces a cluster; its network is created on demand.
    pub async fn put_cluster(&self, cluster: Cluster) {
        let mut store = self.store.lock().await;
        store.networks.insert(cluster.network_id.clone());
        store
            .clusters
            .entry(cluster.network_id.clone())
            .or_default()
            .insert(cluster.id.clone(), cluster);
    }

    pub async fn remove_cluster(&self, network_id: &str, cluster_id: &str) {
        let mut store = self.store.lock().await;
        if let Some(clusters) = store.clusters.get_mut(network_id) {
            clusters.remove(cluster_id);
        }
        store
            .nodes
            .remove(&(network_id.to_string(), cluster_id.to_string()));
    }

    pub async fn put_node(&self, network_id: &str, node: Node) {
        let mut store = self.store.lock().await;
        let nodes = store
            .nodes
            .entry((network_id.to_string(), node.cluster_id.clone()))
            .or_default();
        nodes.retain(|existing| existing.id != node.id);
        nodes.push(node);
    }

    pub async fn put_descriptor(&self, descriptor: AppDescriptor) {
        let mut store = self.store.lock().await;
        store.networks.insert(descriptor.network_id.clone());
        store.descriptors.insert(
            (descriptor.network_id.clone(), descriptor.id.clone()),
            descriptor,
        );
    }

    /// Instances of the network in id order.
    pub async fn instances(&self, network_id: &str) -> Vec<AppInstance> {
        self.store
            .lock()
            .await
            .instances
            .get(network_id)
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes every subsequent call of `op` fail with a service error.
    pub async fn fail(&self, op: InventoryOperation) {
        self.store.lock().await.failing.insert(op);
    }

    pub async fn recover(&self, op: InventoryOperation) {
        self.store.lock().await.failing.remove(&op);
    }

    /// Number of successful instance writes (add, update, delete).
    pub async fn write_count(&self) -> usize {
        self.store.lock().await.writes
    }
}

#[async_trait]
impl Inventory for InMemoryInventory {
    async fn get_descriptor(
        &self,
        network_id: &str,
        descriptor_id: &str,
    ) -> Result<AppDescriptor, InventoryError> {
        let store = self.store.lock().await;
        store.check(InventoryOperation::GetDescriptor)?;
        store.network(network_id)?;
        store
            .descriptors
            .get(&(network_id.to_string(), descriptor_id.to_string()))
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("descriptor {descriptor_id}")))
    }

    async fn list_clusters(&self, network_id: &str) -> Result<Vec<Cluster>, InventoryError> {
        let store = self.store.lock().await;
        store.check(InventoryOperation::ListClusters)?;
        store.network(network_id)?;
        Ok(store
            .clusters
            .get(network_id)
            .map(|clusters| clusters.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_nodes(
        &self,
        network_id: &str,
        cluster_id: &str,
    ) -> Result<Vec<Node>, InventoryError> {
        let store = self.store.lock().await;
        store.check(InventoryOperation::ListNodes)?;
        store.network(network_id)?;
        let known = store
            .clusters
            .get(network_id)
            .is_some_and(|clusters| clusters.contains_key(cluster_id));
        if !known {
            return Err(InventoryError::not_found(format!("cluster {cluster_id}")));
        }
        Ok(store
            .nodes
            .get(&(network_id.to_string(), cluster_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_instance(&self, instance: AppInstance) -> Result<AppInstance, InventoryError> {
        let mut store = self.store.lock().await;
        store.check(InventoryOperation::AddInstance)?;
        store.network(&instance.network_id)?;
        if instance.id.is_empty() || instance.name.is_empty() {
            return Err(InventoryError::Validation {
                operation: "add_instance".into(),
                message: "missing application required fields".into(),
            });
        }
        let instances = store
            .instances
            .entry(instance.network_id.clone())
            .or_default();
        if instances.contains_key(&instance.id) {
            return Err(InventoryError::Conflict {
                operation: "add_instance".into(),
                message: format!("instance {} already exists", instance.id),
            });
        }
        instances.insert(instance.id.clone(), instance.clone());
        store.writes += 1;
        Ok(instance)
    }

    async fn update_instance(
        &self,
        instance: AppInstance,
    ) -> Result<AppInstance, InventoryError> {
        let mut store = self.store.lock().await;
        store.check(InventoryOperation::UpdateInstance)?;
        let slot = store
            .instances
            .get_mut(&instance.network_id)
            .and_then(|instances| instances.get_mut(&instance.id))
            .ok_or_else(|| InventoryError::not_found(format!("instance {}", instance.id)))?;
        *slot = instance.clone();
        store.writes += 1;
        Ok(instance)
    }

    async fn get_instance(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<AppInstance, InventoryError> {
        let store = self.store.lock().await;
        store.check(InventoryOperation::GetInstance)?;
        store
            .instances
            .get(network_id)
            .and_then(|instances| instances.get(instance_id))
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("instance {instance_id}")))
    }

    async fn list_instances(&self, network_id: &str) -> Result<Vec<AppInstance>, InventoryError> {
        let store = self.store.lock().await;
        store.check(InventoryOperation::ListInstances)?;
        store.network(network_id)?;
        Ok(store
            .instances
            .get(network_id)
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_instance(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<(), InventoryError> {
        let mut store = self.store.lock().await;
        store.check(InventoryOperation::DeleteInstance)?;
        let removed = store
            .instances
            .get_mut(network_id)
            .and_then(|instances| instances.remove(instance_id));
        if removed.is_none() {
            return Err(InventoryError::not_found(format!("instance {instance_id}")));
        }
        store.writes += 1;
        Ok(())
    }
}
