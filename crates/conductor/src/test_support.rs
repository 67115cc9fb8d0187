//! Fakes and fixtures shared by unit and integration tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use common::api::{
    AppDescriptor, ApplicationPort, Cluster, ClusterStatus, ClusterType, DeployRequest,
    MASTER_NODE_LABEL, Node,
};

use crate::{
    agent::{
        AgentError, AppList, AppSummary, ClusterAgent, ClusterAgentFactory, DynClusterAgent,
        StartCommand,
    },
    inventory::InMemoryInventory,
    logs::{LogAggregator, LogAggregatorError},
    orchestrator::OrchestratorSettings,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start call as observed by a fake cluster agent.
#[derive(Debug, Clone)]
pub struct StartRecord {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub service_name: String,
    pub arguments: Vec<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Default)]
struct AgentState {
    starts: Vec<StartRecord>,
    stops: Vec<String>,
    running: BTreeMap<String, AppSummary>,
    fail_start: bool,
    fail_list: bool,
    fail_pods: bool,
    unavailable: bool,
    pending_stops: u32,
    start_delay: Option<Duration>,
    stop_delay: Option<Duration>,
}

/// Records every call and keeps the started workloads so that `list`, `stop`
/// and `pods` answer consistently.
#[derive(Clone, Default)]
pub struct FakeClusterAgentFactory {
    state: Arc<Mutex<AgentState>>,
}

impl FakeClusterAgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(&self, fail: bool) {
        lock(&self.state).fail_start = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        lock(&self.state).fail_list = fail;
    }

    pub fn fail_pods(&self, fail: bool) {
        lock(&self.state).fail_pods = fail;
    }

    /// Makes `create` return no client.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// The next `count` stop calls report the workload as still present.
    pub fn set_pending_stops(&self, count: u32) {
        lock(&self.state).pending_stops = count;
    }

    pub fn set_start_delay(&self, delay: Duration) {
        lock(&self.state).start_delay = Some(delay);
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        lock(&self.state).stop_delay = Some(delay);
    }

    /// Drops every running workload as if removed out of band.
    pub fn forget_running(&self) {
        lock(&self.state).running.clear();
    }

    pub fn starts(&self) -> Vec<StartRecord> {
        lock(&self.state).starts.clone()
    }

    pub fn stops(&self) -> Vec<String> {
        lock(&self.state).stops.clone()
    }

    pub fn running(&self) -> Vec<String> {
        lock(&self.state).running.keys().cloned().collect()
    }
}

impl ClusterAgentFactory for FakeClusterAgentFactory {
    fn create(&self, host: &str, port: u16) -> Result<DynClusterAgent, AgentError> {
        if lock(&self.state).unavailable || host.is_empty() {
            return Err(AgentError::Unavailable {
                address: format!("{host}:{port}"),
            });
        }
        Ok(Arc::new(FakeClusterAgent {
            host: host.to_string(),
            port,
            state: self.state.clone(),
        }))
    }
}

struct FakeClusterAgent {
    host: String,
    port: u16,
    state: Arc<Mutex<AgentState>>,
}

#[async_trait]
impl ClusterAgent for FakeClusterAgent {
    async fn start(
        &self,
        descriptor: &AppDescriptor,
        request: &DeployRequest,
    ) -> Result<(), AgentError> {
        let delay = lock(&self.state).start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let command = StartCommand::new(descriptor, request);
        let mut state = lock(&self.state);
        state.starts.push(StartRecord {
            host: self.host.clone(),
            port: self.port,
            name: command.instance_name.clone(),
            service_name: command.service_name.clone(),
            arguments: command.arguments.clone(),
            labels: command.labels.clone(),
        });
        if state.fail_start {
            return Err(AgentError::Rejected {
                operation: "start",
                status: 500,
                body: "start rejected".into(),
            });
        }
        state.running.insert(
            command.instance_name.clone(),
            AppSummary {
                name: command.instance_name,
                application: command.service_name,
                version: command.service_version,
                status: "deployed".into(),
                labels: command.labels,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn stop(&self, instance_name: &str) -> Result<bool, AgentError> {
        let delay = lock(&self.state).stop_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        state.stops.push(instance_name.to_string());
        if state.pending_stops > 0 {
            state.pending_stops -= 1;
            return Ok(false);
        }
        state.running.remove(instance_name);
        Ok(true)
    }

    async fn pods(&self, instance_name: &str) -> Result<Vec<String>, AgentError> {
        let state = lock(&self.state);
        if state.fail_pods {
            return Err(AgentError::Rejected {
                operation: "pods",
                status: 500,
                body: "pods unavailable".into(),
            });
        }
        Ok(if state.running.contains_key(instance_name) {
            vec![format!("{instance_name}-0")]
        } else {
            Vec::new()
        })
    }

    async fn list(&self) -> Result<AppList, AgentError> {
        let state = lock(&self.state);
        if state.fail_list {
            return Err(AgentError::Rejected {
                operation: "list",
                status: 503,
                body: "list unavailable".into(),
            });
        }
        let applications: Vec<AppSummary> = state.running.values().cloned().collect();
        let count = applications.len() as i64;
        Ok(AppList {
            count,
            next: String::new(),
            total: count,
            applications,
        })
    }
}

/// Returns fixed lines and remembers the pod sets it was asked about.
#[derive(Clone, Default)]
pub struct StaticLogAggregator {
    lines: Vec<String>,
    queries: Arc<Mutex<Vec<Vec<String>>>>,
}

impl StaticLogAggregator {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines,
            queries: Arc::default(),
        }
    }

    pub fn queries(&self) -> Vec<Vec<String>> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl LogAggregator for StaticLogAggregator {
    async fn logs(&self, pods: &[String]) -> Result<Vec<String>, LogAggregatorError> {
        lock(&self.queries).push(pods.to_vec());
        Ok(self.lines.clone())
    }
}

/// Installed edge cluster with one master node reachable at `public_ip`.
pub async fn seed_cluster(
    inventory: &InMemoryInventory,
    network_id: &str,
    cluster_id: &str,
    status: ClusterStatus,
    public_ip: &str,
) {
    inventory
        .put_cluster(Cluster {
            id: cluster_id.into(),
            network_id: network_id.into(),
            name: format!("{cluster_id}-name"),
            cluster_type: ClusterType::Edge,
            status,
            drain: false,
            cordon: false,
        })
        .await;
    inventory
        .put_node(
            network_id,
            Node {
                id: format!("{cluster_id}-master"),
                cluster_id: cluster_id.into(),
                name: format!("{cluster_id}-master"),
                labels: vec![MASTER_NODE_LABEL.into()],
                public_ip: public_ip.into(),
                status: "ready".into(),
            },
        )
        .await;
}

pub async fn seed_descriptor(inventory: &InMemoryInventory, network_id: &str, descriptor_id: &str) {
    inventory
        .put_descriptor(AppDescriptor {
            id: descriptor_id.into(),
            network_id: network_id.into(),
            name: "app1".into(),
            service_name: "nginx".into(),
            service_version: "1.2.0".into(),
            supported_cluster_type: ClusterType::Edge,
            port: 8080,
            images: vec!["nginx:1.2".into()],
            ports: vec![ApplicationPort {
                internal: 80,
                external: 8080,
                protocol: "tcp".into(),
            }],
        })
        .await;
}

pub fn deploy_request(name: &str, descriptor_id: &str) -> DeployRequest {
    DeployRequest {
        descriptor_id: descriptor_id.into(),
        name: name.into(),
        description: format!("{name} created at {}", Utc::now().to_rfc3339()),
        ..Default::default()
    }
}

/// Default settings with short deadlines and no wait between stop polls.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        start_timeout: Duration::from_secs(5),
        stop_timeout: Duration::from_secs(5),
        pods_timeout: Duration::from_secs(5),
        list_timeout: Duration::from_secs(5),
        stop_poll_attempts: 5,
        stop_poll_interval: Duration::from_millis(1),
        ..OrchestratorSettings::default()
    }
}
