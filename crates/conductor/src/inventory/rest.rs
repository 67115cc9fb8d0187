use std::time::Duration;

use async_trait::async_trait;
use common::api::{AppDescriptor, AppInstance, Cluster, Node};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{Inventory, InventoryError};
use crate::config::InventoryConfig;

/// REST client of the inventory service.
#[derive(Clone)]
pub struct HttpInventory {
    base_url: String,
    client: reqwest::Client,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl HttpInventory {
    pub fn new(cfg: &InventoryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("conductor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: reqwest::Client, cfg: &InventoryConfig) -> Self {
        Self {
            base_url: cfg.address.trim_end_matches('/').to_string(),
            client,
            read_timeout: cfg.read_timeout(),
            write_timeout: cfg.write_timeout(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, InventoryError> {
        let res = request.send().await.map_err(|err| {
            warn!(operation, ?err, "inventory request failed");
            InventoryError::Transport {
                operation: operation.to_string(),
                source: err.into(),
            }
        })?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res.text().await.unwrap_or_default();
        debug!(operation, %status, body = %body, "inventory returned error");
        Err(map_status(operation, resource, status, body))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<T, InventoryError> {
        let res = self.execute(operation, resource, request).await?;
        res.json::<T>()
            .await
            .map_err(|err| InventoryError::Transport {
                operation: operation.to_string(),
                source: anyhow::Error::new(err).context("invalid inventory response body"),
            })
    }
}

fn map_status(operation: &str, resource: &str, status: StatusCode, body: String) -> InventoryError {
    match status {
        StatusCode::NOT_FOUND => InventoryError::not_found(resource),
        StatusCode::CONFLICT => InventoryError::Conflict {
            operation: operation.to_string(),
            message: body,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => InventoryError::Validation {
            operation: operation.to_string(),
            message: body,
        },
        other => InventoryError::Service {
            operation: operation.to_string(),
            status: other.as_u16(),
            body,
        },
    }
}

pub(crate) fn descriptor_path(network_id: &str, descriptor_id: &str) -> String {
    format!("/api/v0/app/{network_id}/descriptor/{descriptor_id}/info")
}

pub(crate) fn clusters_path(network_id: &str) -> String {
    format!("/api/v0/cluster/{network_id}/list")
}

pub(crate) fn nodes_path(network_id: &str, cluster_id: &str) -> String {
    format!("/api/v0/node/{network_id}/{cluster_id}/list")
}

pub(crate) fn add_instance_path(network_id: &str) -> String {
    format!("/api/v0/app/{network_id}/instance/add")
}

pub(crate) fn instances_path(network_id: &str) -> String {
    format!("/api/v0/app/{network_id}/instance/list")
}

pub(crate) fn instance_path(network_id: &str, instance_id: &str, action: &str) -> String {
    format!("/api/v0/app/{network_id}/instance/{instance_id}/{action}")
}

#[async_trait]
impl Inventory for HttpInventory {
    async fn get_descriptor(
        &self,
        network_id: &str,
        descriptor_id: &str,
    ) -> Result<AppDescriptor, InventoryError> {
        let url = self.url(&descriptor_path(network_id, descriptor_id));
        self.fetch(
            "get_descriptor",
            &format!("descriptor {descriptor_id}"),
            self.client.get(url).timeout(self.read_timeout),
        )
        .await
    }

    async fn list_clusters(&self, network_id: &str) -> Result<Vec<Cluster>, InventoryError> {
        let url = self.url(&clusters_path(network_id));
        let mut clusters: Vec<Cluster> = self
            .fetch(
                "list_clusters",
                &format!("network {network_id}"),
                self.client.get(url).timeout(self.read_timeout),
            )
            .await?;
        clusters.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(clusters)
    }

    async fn list_nodes(
        &self,
        network_id: &str,
        cluster_id: &str,
    ) -> Result<Vec<Node>, InventoryError> {
        let url = self.url(&nodes_path(network_id, cluster_id));
        self.fetch(
            "list_nodes",
            &format!("cluster {cluster_id}"),
            self.client.get(url).timeout(self.read_timeout),
        )
        .await
    }

    async fn add_instance(&self, instance: AppInstance) -> Result<AppInstance, InventoryError> {
        let url = self.url(&add_instance_path(&instance.network_id));
        self.fetch(
            "add_instance",
            &format!("network {}", instance.network_id),
            self.client.post(url).json(&instance).timeout(self.write_timeout),
        )
        .await
    }

    async fn update_instance(
        &self,
        instance: AppInstance,
    ) -> Result<AppInstance, InventoryError> {
        let url = self.url(&instance_path(&instance.network_id, &instance.id, "update"));
        self.fetch(
            "update_instance",
            &format!("instance {}", instance.id),
            self.client.post(url).json(&instance).timeout(self.write_timeout),
        )
        .await
    }

    async fn get_instance(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<AppInstance, InventoryError> {
        let url = self.url(&instance_path(network_id, instance_id, "info"));
        self.fetch(
            "get_instance",
            &format!("instance {instance_id}"),
            self.client.get(url).timeout(self.read_timeout),
        )
        .await
    }

    async fn list_instances(&self, network_id: &str) -> Result<Vec<AppInstance>, InventoryError> {
        let url = self.url(&instances_path(network_id));
        self.fetch(
            "list_instances",
            &format!("network {network_id}"),
            self.client.get(url).timeout(self.read_timeout),
        )
        .await
    }

    async fn delete_instance(
        &self,
        network_id: &str,
        instance_id: &str,
    ) -> Result<(), InventoryError> {
        let url = self.url(&instance_path(network_id, instance_id, "delete"));
        self.execute(
            "delete_instance",
            &format!("instance {instance_id}"),
            self.client.delete(url).timeout(self.write_timeout),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::api::{InstanceStatus, StorageType};
    use httpmock::{
        Method::{DELETE, GET, POST},
        MockServer,
    };
    use serde_json::json;

    fn client_for(server: &MockServer) -> HttpInventory {
        HttpInventory::new(&InventoryConfig {
            address: server.base_url(),
            read_timeout_secs: 5,
            write_timeout_secs: 5,
        })
        .expect("client builds")
    }

    fn instance(network_id: &str, id: &str) -> AppInstance {
        AppInstance {
            id: id.into(),
            network_id: network_id.into(),
            descriptor_id: "d1".into(),
            cluster_id: "c1".into(),
            name: "app1".into(),
            description: String::new(),
            label: String::new(),
            arguments: String::new(),
            storage_bytes: String::new(),
            storage_type: StorageType::Default,
            ports: Vec::new(),
            port: 80,
            cluster_address: "10.0.0.1".into(),
            status: InstanceStatus::Deploying,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn list_clusters_returns_clusters_sorted_by_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v0/cluster/n1/list");
                then.status(200).json_body(json!([
                    {"id": "c3", "networkId": "n1", "type": "edge", "status": "installed"},
                    {"id": "c1", "networkId": "n1", "type": "cloud", "status": "installed"},
                    {"id": "c2", "networkId": "n1", "type": "edge", "status": "created"}
                ]));
            })
            .await;

        let clusters = client_for(&server)
            .list_clusters("n1")
            .await
            .expect("clusters listed");

        mock.assert_async().await;
        let ids: Vec<_> = clusters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn missing_descriptor_maps_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v0/app/n1/descriptor/d404/info");
                then.status(404).body("descriptor not found");
            })
            .await;

        let err = client_for(&server)
            .get_descriptor("n1", "d404")
            .await
            .expect_err("descriptor is missing");

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "descriptor d404 not found");
    }

    #[tokio::test]
    async fn server_errors_keep_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v0/node/n1/c1/list");
                then.status(503).body("maintenance");
            })
            .await;

        let err = client_for(&server)
            .list_nodes("n1", "c1")
            .await
            .expect_err("inventory unavailable");

        match err {
            InventoryError::Service { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_instance_posts_instance_body() {
        let server = MockServer::start_async().await;
        let stored = instance("n1", "i1");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v0/app/n1/instance/add")
                    .json_body_partial(r#"{"deployedId": "i1", "appDescriptorId": "d1", "status": "deploying"}"#);
                then.status(200).json_body_obj(&stored);
            })
            .await;

        let added = client_for(&server)
            .add_instance(instance("n1", "i1"))
            .await
            .expect("instance added");

        mock.assert_async().await;
        assert_eq!(added.id, "i1");
    }

    #[tokio::test]
    async fn add_instance_conflict_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v0/app/n1/instance/add");
                then.status(409).body("duplicated instance");
            })
            .await;

        let err = client_for(&server)
            .add_instance(instance("n1", "i1"))
            .await
            .expect_err("conflict");

        assert!(matches!(err, InventoryError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delete_instance_uses_delete_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v0/app/n1/instance/i1/delete");
                then.status(200);
            })
            .await;

        client_for(&server)
            .delete_instance("n1", "i1")
            .await
            .expect("instance deleted");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_inventory_is_transport_error() {
        let inventory = HttpInventory::new(&InventoryConfig {
            address: "http://127.0.0.1:1".into(),
            read_timeout_secs: 1,
            write_timeout_secs: 1,
        })
        .expect("client builds");

        let err = inventory
            .get_instance("n1", "i1")
            .await
            .expect_err("nothing listens on port 1");

        assert!(matches!(err, InventoryError::Transport { .. }));
    }
}
