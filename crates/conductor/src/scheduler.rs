use std::{collections::HashMap, sync::Arc};

use common::api::{Cluster, ClusterType, Node};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    error::{ConductorError, ConductorResult, ErrorKind},
    inventory::{DynInventory, InventoryError},
};

/// Per-network round-robin selection over eligible clusters.
///
/// Cursors live in memory only and start at zero after a restart.
#[derive(Clone)]
pub struct RoundRobinScheduler {
    inventory: DynInventory,
    cursors: Arc<Mutex<HashMap<String, u64>>>,
    filter_by_cluster_type: bool,
}

#[derive(Debug, Clone)]
pub struct ScheduleDecision {
    pub cluster: Cluster,
    pub node: Node,
    /// Position of `cluster` among the eligible clusters.
    pub index: usize,
    pub eligible_clusters: usize,
    pub total_clusters: usize,
    pub master_nodes: usize,
}

impl RoundRobinScheduler {
    pub fn new(inventory: DynInventory, filter_by_cluster_type: bool) -> Self {
        Self {
            inventory,
            cursors: Arc::new(Mutex::new(HashMap::new())),
            filter_by_cluster_type,
        }
    }

    /// Picks a cluster and a node for the next instance of `network_id`.
    ///
    /// `cluster_type` only narrows the candidates when type filtering is enabled.
    pub async fn select(
        &self,
        network_id: &str,
        cluster_type: Option<ClusterType>,
    ) -> ConductorResult<ScheduleDecision> {
        let clusters = match self.inventory.list_clusters(network_id).await {
            Ok(clusters) => clusters,
            Err(err @ InventoryError::NotFound { .. }) => {
                self.forget(network_id).await;
                counter!("conductor_placements_total", "outcome" => "network_not_found")
                    .increment(1);
                return Err(ConductorError::from_inventory("cannot list clusters", err)
                    .with_param(network_id));
            }
            Err(err) => {
                counter!("conductor_placements_total", "outcome" => "error").increment(1);
                return Err(ConductorError::from_inventory("cannot list clusters", err)
                    .with_param(network_id));
            }
        };
        let total_clusters = clusters.len();

        let required_type = cluster_type.filter(|_| self.filter_by_cluster_type);
        let eligible: Vec<Cluster> = clusters
            .into_iter()
            .filter(Cluster::is_eligible)
            .filter(|cluster| required_type.is_none_or(|ty| cluster.cluster_type == ty))
            .collect();

        if eligible.is_empty() {
            counter!("conductor_placements_total", "outcome" => "no_eligible_cluster")
                .increment(1);
            return Err(
                ConductorError::new(ErrorKind::NoEligibleCluster, "no available clusters")
                    .with_param(network_id),
            );
        }

        let index = self.advance(network_id, eligible.len()).await;
        let cluster = eligible[index].clone();
        debug!(
            network_id,
            cluster_id = %cluster.id,
            index,
            eligible = eligible.len(),
            "cluster selected"
        );

        let nodes = self
            .inventory
            .list_nodes(network_id, &cluster.id)
            .await
            .map_err(|err| {
                counter!("conductor_placements_total", "outcome" => "error").increment(1);
                ConductorError::from_inventory("cannot list nodes", err)
                    .with_param(network_id)
                    .with_param(cluster.id.clone())
            })?;

        let masters: Vec<&Node> = nodes.iter().filter(|node| node.is_master()).collect();
        let master_nodes = masters.len();
        let node = masters
            .first()
            .copied()
            .or_else(|| nodes.first())
            .cloned()
            .ok_or_else(|| {
                counter!("conductor_placements_total", "outcome" => "no_node").increment(1);
                ConductorError::new(ErrorKind::NoNode, "node not available")
                    .with_param(network_id)
                    .with_param(cluster.id.clone())
            })?;

        counter!("conductor_placements_total", "outcome" => "selected").increment(1);
        info!(
            network_id,
            cluster_id = %cluster.id,
            node_id = %node.id,
            node_ip = %node.public_ip,
            "placement decided"
        );

        Ok(ScheduleDecision {
            cluster,
            node,
            index,
            eligible_clusters: eligible.len(),
            total_clusters,
            master_nodes,
        })
    }

    /// Returns the index for this call and moves the cursor forward in one step.
    async fn advance(&self, network_id: &str, eligible: usize) -> usize {
        let mut cursors = self.cursors.lock().await;
        let cursor = cursors.entry(network_id.to_string()).or_insert(0);
        let index = (*cursor % eligible as u64) as usize;
        *cursor = cursor.wrapping_add(1);
        index
    }

    async fn forget(&self, network_id: &str) {
        if self.cursors.lock().await.remove(network_id).is_some() {
            debug!(network_id, "dropped placement cursor of missing network");
        }
    }

    /// Current cursor of the network, if one was created.
    pub async fn cursor(&self, network_id: &str) -> Option<u64> {
        self.cursors.lock().await.get(network_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InMemoryInventory;
    use crate::inventory::memory::InventoryOperation;
    use common::api::ClusterStatus;

    fn cluster(id: &str, status: ClusterStatus) -> Cluster {
        Cluster {
            id: id.into(),
            network_id: "n1".into(),
            name: id.into(),
            cluster_type: ClusterType::Edge,
            status,
            drain: false,
            cordon: false,
        }
    }

    fn node(id: &str, cluster_id: &str, labels: &[&str], ip: &str) -> Node {
        Node {
            id: id.into(),
            cluster_id: cluster_id.into(),
            name: id.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            public_ip: ip.into(),
            status: "installed".into(),
        }
    }

    async fn inventory_with(clusters: &[Cluster]) -> InMemoryInventory {
        let inventory = InMemoryInventory::new();
        for (idx, c) in clusters.iter().enumerate() {
            inventory.put_cluster(c.clone()).await;
            inventory
                .put_node(
                    "n1",
                    node(&format!("{}-m", c.id), &c.id, &["master"], &format!("10.0.0.{}", idx + 1)),
                )
                .await;
        }
        inventory
    }

    fn scheduler(inventory: &InMemoryInventory) -> RoundRobinScheduler {
        RoundRobinScheduler::new(Arc::new(inventory.clone()), false)
    }

    #[tokio::test]
    async fn rotates_through_installed_clusters_in_order() {
        let inventory = inventory_with(&[
            cluster("c1", ClusterStatus::Installed),
            cluster("c2", ClusterStatus::Installed),
            cluster("c3", ClusterStatus::Installed),
        ])
        .await;
        let scheduler = scheduler(&inventory);

        let mut chosen = Vec::new();
        for _ in 0..4 {
            chosen.push(scheduler.select("n1", None).await.expect("placement").cluster.id);
        }
        assert_eq!(chosen, vec!["c1", "c2", "c3", "c1"]);
    }

    #[tokio::test]
    async fn skips_clusters_that_are_not_installed() {
        let inventory = inventory_with(&[
            cluster("c1", ClusterStatus::Installed),
            cluster("c2", ClusterStatus::Created),
            cluster("c3", ClusterStatus::Installed),
        ])
        .await;
        let scheduler = scheduler(&inventory);

        let mut chosen = Vec::new();
        for _ in 0..3 {
            chosen.push(scheduler.select("n1", None).await.expect("placement").cluster.id);
        }
        assert_eq!(chosen, vec!["c1", "c3", "c1"]);
    }

    #[tokio::test]
    async fn cordoned_and_draining_clusters_are_not_eligible() {
        let mut cordoned = cluster("c1", ClusterStatus::Installed);
        cordoned.cordon = true;
        let mut drained = cluster("c2", ClusterStatus::Installed);
        drained.drain = true;
        let inventory = inventory_with(&[cordoned, drained]).await;

        let err = scheduler(&inventory)
            .select("n1", None)
            .await
            .expect_err("no eligible cluster");
        assert_eq!(err.kind, ErrorKind::NoEligibleCluster);
        assert_eq!(err.message, "no available clusters");
    }

    #[tokio::test]
    async fn shrinking_cluster_set_never_indexes_out_of_range() {
        let inventory = inventory_with(&[
            cluster("c1", ClusterStatus::Installed),
            cluster("c2", ClusterStatus::Installed),
            cluster("c3", ClusterStatus::Installed),
        ])
        .await;
        let scheduler = scheduler(&inventory);
        scheduler.select("n1", None).await.expect("placement");
        scheduler.select("n1", None).await.expect("placement");

        inventory.remove_cluster("n1", "c3").await;
        inventory.remove_cluster("n1", "c2").await;

        let decision = scheduler.select("n1", None).await.expect("placement");
        assert_eq!(decision.cluster.id, "c1");
        assert_eq!(decision.eligible_clusters, 1);
    }

    #[tokio::test]
    async fn prefers_master_nodes_and_falls_back_to_any_node() {
        let inventory = InMemoryInventory::new();
        inventory.put_cluster(cluster("c1", ClusterStatus::Installed)).await;
        inventory.put_node("n1", node("w1", "c1", &["worker"], "10.0.0.1")).await;
        inventory.put_node("n1", node("m1", "c1", &["master"], "10.0.0.2")).await;
        let scheduler = scheduler(&inventory);

        let decision = scheduler.select("n1", None).await.expect("placement");
        assert_eq!(decision.node.id, "m1");
        assert_eq!(decision.master_nodes, 1);

        let fallback = InMemoryInventory::new();
        fallback.put_cluster(cluster("c1", ClusterStatus::Installed)).await;
        fallback.put_node("n1", node("w1", "c1", &["Master"], "10.0.0.1")).await;
        let decision = RoundRobinScheduler::new(Arc::new(fallback), false)
            .select("n1", None)
            .await
            .expect("placement falls back");
        assert_eq!(decision.node.id, "w1");
        assert_eq!(decision.master_nodes, 0);
    }

    #[tokio::test]
    async fn cluster_without_nodes_is_no_node_but_cursor_advances() {
        let inventory = InMemoryInventory::new();
        inventory.put_cluster(cluster("c1", ClusterStatus::Installed)).await;
        let scheduler = scheduler(&inventory);

        let err = scheduler.select("n1", None).await.expect_err("no nodes");
        assert_eq!(err.kind, ErrorKind::NoNode);
        assert_eq!(scheduler.cursor("n1").await, Some(1));
    }

    #[tokio::test]
    async fn missing_network_drops_cursor() {
        let inventory = inventory_with(&[cluster("c1", ClusterStatus::Installed)]).await;
        let scheduler = scheduler(&inventory);
        scheduler.select("n1", None).await.expect("placement");
        assert_eq!(scheduler.cursor("n1").await, Some(1));

        inventory.remove_network("n1").await;
        let err = scheduler.select("n1", None).await.expect_err("network gone");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(scheduler.cursor("n1").await, None);
    }

    #[tokio::test]
    async fn inventory_failure_leaves_cursor_untouched() {
        let inventory = inventory_with(&[cluster("c1", ClusterStatus::Installed)]).await;
        inventory.fail(InventoryOperation::ListClusters).await;
        let scheduler = scheduler(&inventory);

        let err = scheduler.select("n1", None).await.expect_err("inventory down");
        assert_eq!(err.kind, ErrorKind::Inventory);
        assert_eq!(scheduler.cursor("n1").await, None);
    }

    #[tokio::test]
    async fn type_filter_applies_only_when_enabled() {
        let mut cloud = cluster("c1", ClusterStatus::Installed);
        cloud.cluster_type = ClusterType::Cloud;
        let edge = cluster("c2", ClusterStatus::Installed);
        let inventory = inventory_with(&[cloud, edge]).await;

        let filtering = RoundRobinScheduler::new(Arc::new(inventory.clone()), true);
        for _ in 0..2 {
            let decision = filtering
                .select("n1", Some(ClusterType::Edge))
                .await
                .expect("placement");
            assert_eq!(decision.cluster.id, "c2");
        }

        let permissive = scheduler(&inventory);
        let first = permissive
            .select("n1", Some(ClusterType::Edge))
            .await
            .expect("placement");
        assert_eq!(first.cluster.id, "c1");
    }

    #[tokio::test]
    async fn concurrent_selects_get_distinct_indices() {
        let inventory = inventory_with(&[
            cluster("c1", ClusterStatus::Installed),
            cluster("c2", ClusterStatus::Installed),
            cluster("c3", ClusterStatus::Installed),
            cluster("c4", ClusterStatus::Installed),
        ])
        .await;
        let scheduler = scheduler(&inventory);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler.select("n1", None).await.expect("placement").index
            }));
        }
        let mut indices = Vec::new();
        for handle in handles {
            indices.push(handle.await.expect("task joins"));
        }
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }
}
