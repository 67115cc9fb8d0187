use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use common::api::{AppDescriptor, AppInstance, DeployRequest, InstanceStatus};
use metrics::counter;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    agent::{
        self, AgentError, CLUSTER_ID_LABEL, DEPLOYED_ID_LABEL, DynClusterAgent,
        DynClusterAgentFactory, NETWORK_ID_LABEL,
    },
    config::{AgentConfig, AppConfig, FeatureFlags},
    error::{ConductorError, ConductorResult, ErrorKind},
    inventory::{DynInventory, InventoryError},
    logs::DynLogAggregator,
    scheduler::RoundRobinScheduler,
    validation,
};

/// Knobs of the deploy and undeploy transactions.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub agent_port: u16,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
    pub pods_timeout: Duration,
    pub list_timeout: Duration,
    pub stop_poll_attempts: u32,
    pub stop_poll_interval: Duration,
    pub filter_by_cluster_type: bool,
    pub enforce_unique_names: bool,
    pub strict_arguments: bool,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            agent_port: cfg.agent.port,
            start_timeout: cfg.agent.start_timeout(),
            stop_timeout: cfg.agent.stop_timeout(),
            pods_timeout: cfg.agent.pods_timeout(),
            list_timeout: cfg.agent.list_timeout(),
            stop_poll_attempts: cfg.agent.stop_poll_attempts,
            stop_poll_interval: cfg.agent.stop_poll_interval(),
            filter_by_cluster_type: cfg.placement.filter_by_cluster_type,
            enforce_unique_names: cfg.features.enforce_unique_names,
            strict_arguments: cfg.features.strict_arguments,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let agent = AgentConfig::default();
        let features = FeatureFlags::default();
        Self {
            agent_port: agent.port,
            start_timeout: agent.start_timeout(),
            stop_timeout: agent.stop_timeout(),
            pods_timeout: agent.pods_timeout(),
            list_timeout: agent.list_timeout(),
            stop_poll_attempts: agent.stop_poll_attempts,
            stop_poll_interval: agent.stop_poll_interval(),
            filter_by_cluster_type: false,
            enforce_unique_names: features.enforce_unique_names,
            strict_arguments: features.strict_arguments,
        }
    }
}

type NameLocks = Arc<Mutex<HashMap<(String, String), Arc<Mutex<()>>>>>;

/// Owns the write path of application instances.
#[derive(Clone)]
pub struct Orchestrator {
    inventory: DynInventory,
    scheduler: RoundRobinScheduler,
    agents: DynClusterAgentFactory,
    logs: DynLogAggregator,
    settings: OrchestratorSettings,
    name_locks: NameLocks,
}

impl Orchestrator {
    pub fn new(
        inventory: DynInventory,
        agents: DynClusterAgentFactory,
        logs: DynLogAggregator,
        settings: OrchestratorSettings,
    ) -> Self {
        let scheduler =
            RoundRobinScheduler::new(inventory.clone(), settings.filter_by_cluster_type);
        Self {
            inventory,
            scheduler,
            agents,
            logs,
            settings,
            name_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn scheduler(&self) -> &RoundRobinScheduler {
        &self.scheduler
    }

    /// Places, reserves and starts a new instance.
    ///
    /// The returned instance is `ready`. On any failure after the reservation
    /// the inventory record is removed again, so no `deploying` instance
    /// outlives the call.
    pub async fn deploy(
        &self,
        network_id: &str,
        request: DeployRequest,
    ) -> ConductorResult<AppInstance> {
        let result = self.deploy_inner(network_id, request).await;
        match &result {
            Ok(_) => counter!("conductor_deploys_total", "outcome" => "success").increment(1),
            Err(err) => {
                counter!("conductor_deploys_total", "outcome" => err.kind.as_str()).increment(1)
            }
        }
        result
    }

    async fn deploy_inner(
        &self,
        network_id: &str,
        request: DeployRequest,
    ) -> ConductorResult<AppInstance> {
        validation::validate_deploy_request(network_id, &request)?;
        if self.settings.strict_arguments {
            agent::args::parse_arguments(&agent::split_arguments(&request.arguments)).map_err(
                |err| {
                    ConductorError::validation("invalid application arguments")
                        .with_param(request.name.clone())
                        .caused_by(err)
                },
            )?;
        }

        let descriptor = self
            .inventory
            .get_descriptor(network_id, &request.descriptor_id)
            .await
            .map_err(|err| match err {
                InventoryError::NotFound { .. } => ConductorError::new(
                    ErrorKind::DescriptorNotFound,
                    "cannot retrieve application descriptor",
                )
                .with_param(network_id)
                .with_param(request.descriptor_id.clone())
                .caused_by(err),
                err => ConductorError::from_inventory("cannot retrieve application descriptor", err)
                    .with_param(network_id)
                    .with_param(request.descriptor_id.clone()),
            })?;

        let _name_guard = if self.settings.enforce_unique_names {
            let guard = self.lock_name(network_id, &request.name).await;
            self.ensure_name_free(network_id, &request.name).await?;
            Some(guard)
        } else {
            None
        };

        let decision = self
            .scheduler
            .select(network_id, Some(descriptor.supported_cluster_type))
            .await?;

        let reserved = AppInstance {
            id: Uuid::new_v4().to_string(),
            network_id: network_id.to_string(),
            descriptor_id: descriptor.id.clone(),
            cluster_id: decision.cluster.id.clone(),
            name: request.name.clone(),
            description: request.description.clone(),
            label: request.label.clone(),
            arguments: request.arguments.clone(),
            storage_bytes: request.storage_bytes.clone(),
            storage_type: request.storage_type,
            ports: descriptor.ports.clone(),
            port: descriptor.port,
            cluster_address: decision.node.public_ip.clone(),
            status: InstanceStatus::Deploying,
            created_at: Utc::now(),
        };
        let instance = self.inventory.add_instance(reserved).await.map_err(|err| {
            store_error("cannot store application", err)
                .with_param(network_id)
                .with_param(request.name.clone())
        })?;
        info!(
            network_id,
            instance_id = %instance.id,
            cluster_id = %instance.cluster_id,
            node_ip = %instance.cluster_address,
            "instance reserved"
        );

        let mut rollback = RollbackGuard::arm(self.inventory.clone(), &instance);

        if let Err(err) = self.start(&descriptor, &request, &instance).await {
            let mut failure = ConductorError::from_agent("cannot start application", err)
                .with_param(network_id)
                .with_param(instance.name.clone());
            // The guard stays armed until the delete returns.
            let deleted = self.delete_reservation(&instance).await;
            rollback.disarm();
            if let Err(rollback_err) = deleted {
                failure = failure.with_rollback_failure(rollback_err);
            }
            return Err(failure);
        }

        let ready = AppInstance {
            status: InstanceStatus::Ready,
            ..instance.clone()
        };
        let stored = match self.inventory.update_instance(ready).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    network_id,
                    instance_id = %instance.id,
                    %err,
                    "instance update failed after start, withdrawing workload"
                );
                let mut failure = ConductorError::new(ErrorKind::Inventory, "cannot update application")
                    .with_param(network_id)
                    .with_param(instance.id.clone())
                    .caused_by(err);
                if let Err(stop_err) = self.stop_best_effort(&instance).await {
                    warn!(instance_id = %instance.id, %stop_err, "workload stop after failed update failed");
                }
                let deleted = self.delete_reservation(&instance).await;
                rollback.disarm();
                if let Err(rollback_err) = deleted {
                    failure = failure.with_rollback_failure(rollback_err);
                }
                return Err(failure);
            }
        };
        rollback.disarm();

        info!(
            network_id,
            instance_id = %stored.id,
            name = %stored.name,
            cluster_id = %stored.cluster_id,
            "application deployed"
        );
        Ok(stored)
    }

    /// Stops the workload and forgets the instance.
    ///
    /// An instance that is already gone counts as undeployed.
    pub async fn undeploy(&self, network_id: &str, instance_id: &str) -> ConductorResult<()> {
        let result = self.undeploy_inner(network_id, instance_id).await;
        let outcome = match &result {
            Ok(()) => "success",
            Err(err) => err.kind.as_str(),
        };
        counter!("conductor_undeploys_total", "outcome" => outcome).increment(1);
        result
    }

    async fn undeploy_inner(&self, network_id: &str, instance_id: &str) -> ConductorResult<()> {
        let instance = match self.inventory.get_instance(network_id, instance_id).await {
            Ok(instance) => instance,
            Err(err) if err.is_not_found() => {
                info!(network_id, instance_id, "instance already undeployed");
                return Ok(());
            }
            Err(err) => {
                return Err(ConductorError::from_inventory("cannot retrieve application", err)
                    .with_param(network_id)
                    .with_param(instance_id));
            }
        };

        if instance.cluster_address.is_empty() {
            debug!(network_id, instance_id, "instance was never placed, deleting record only");
            return self.forget_instance(&instance).await;
        }

        let client = self.client_for(&instance).map_err(|err| {
            ConductorError::from_agent("cannot stop application", err)
                .with_param(network_id)
                .with_param(instance.name.clone())
        })?;

        let apps = deadline("list", self.settings.list_timeout, client.list())
            .await
            .map_err(|err| {
                ConductorError::from_agent("cannot list applications", err)
                    .with_param(network_id)
                    .with_param(instance.cluster_address.clone())
            })?;
        let running = apps
            .applications
            .iter()
            .any(|app| app.belongs_to(network_id, &instance.id) || app.name == instance.name);

        if running {
            self.stop_until_removed(client.as_ref(), &instance)
                .await
                .map_err(|err| {
                    ConductorError::from_agent("cannot stop application", err)
                        .with_param(network_id)
                        .with_param(instance.name.clone())
                })?;
        } else {
            info!(
                network_id,
                instance_id,
                name = %instance.name,
                "workload not found on cluster, deleting record only"
            );
        }

        self.forget_instance(&instance).await
    }

    /// Log lines of the pods backing the instance.
    pub async fn logs(&self, network_id: &str, instance_id: &str) -> ConductorResult<Vec<String>> {
        let instance = self
            .inventory
            .get_instance(network_id, instance_id)
            .await
            .map_err(|err| {
                ConductorError::from_inventory("cannot retrieve application", err)
                    .with_param(network_id)
                    .with_param(instance_id)
            })?;

        if instance.cluster_address.is_empty() {
            debug!(network_id, instance_id, "instance has no cluster address, no logs");
            return Ok(Vec::new());
        }

        let client = self.client_for(&instance).map_err(|err| {
            ConductorError::from_agent("cannot retrieve application pods", err)
                .with_param(network_id)
                .with_param(instance.name.clone())
        })?;
        let pods = deadline(
            "pods",
            self.settings.pods_timeout,
            client.pods(&instance.name),
        )
        .await
        .map_err(|err| {
            ConductorError::from_agent("cannot retrieve application pods", err)
                .with_param(network_id)
                .with_param(instance.name.clone())
        })?;

        if pods.is_empty() {
            debug!(network_id, instance_id, "no pods reported for instance");
            return Ok(Vec::new());
        }

        self.logs.logs(&pods).await.map_err(|err| {
            ConductorError::from_log_aggregator("cannot retrieve application logs", err)
                .with_param(network_id)
                .with_param(instance.name.clone())
        })
    }

    pub async fn list_instances(&self, network_id: &str) -> ConductorResult<Vec<AppInstance>> {
        self.inventory
            .list_instances(network_id)
            .await
            .map_err(|err| {
                ConductorError::from_inventory("cannot retrieve applications", err)
                    .with_param(network_id)
            })
    }

    async fn start(
        &self,
        descriptor: &AppDescriptor,
        request: &DeployRequest,
        instance: &AppInstance,
    ) -> Result<(), AgentError> {
        let client = self.client_for(instance)?;
        let mut command = request.clone();
        command
            .labels
            .insert(NETWORK_ID_LABEL.to_string(), instance.network_id.clone());
        command
            .labels
            .insert(CLUSTER_ID_LABEL.to_string(), instance.cluster_id.clone());
        command
            .labels
            .insert(DEPLOYED_ID_LABEL.to_string(), instance.id.clone());

        deadline(
            "start",
            self.settings.start_timeout,
            client.start(descriptor, &command),
        )
        .await
    }

    fn client_for(&self, instance: &AppInstance) -> Result<DynClusterAgent, AgentError> {
        self.agents
            .create(&instance.cluster_address, self.settings.agent_port)
    }

    /// Re-issues Stop while the agent reports the workload as still present.
    async fn stop_until_removed(
        &self,
        client: &dyn agent::ClusterAgent,
        instance: &AppInstance,
    ) -> Result<(), AgentError> {
        let attempts = self.settings.stop_poll_attempts.max(1);
        for attempt in 1..=attempts {
            let stopped = deadline(
                "stop",
                self.settings.stop_timeout,
                client.stop(&instance.name),
            )
            .await?;
            if stopped {
                info!(instance_id = %instance.id, name = %instance.name, attempt, "workload stopped");
                return Ok(());
            }
            debug!(instance_id = %instance.id, attempt, attempts, "workload still stopping");
            if attempt < attempts {
                tokio::time::sleep(self.settings.stop_poll_interval).await;
            }
        }
        Err(AgentError::Rejected {
            operation: "stop",
            status: 0,
            body: format!("workload still present after {attempts} stop attempts"),
        })
    }

    async fn stop_best_effort(&self, instance: &AppInstance) -> Result<bool, AgentError> {
        let client = self.client_for(instance)?;
        deadline(
            "stop",
            self.settings.stop_timeout,
            client.stop(&instance.name),
        )
        .await
    }

    async fn forget_instance(&self, instance: &AppInstance) -> ConductorResult<()> {
        match self
            .inventory
            .delete_instance(&instance.network_id, &instance.id)
            .await
        {
            Ok(()) => {
                info!(
                    network_id = %instance.network_id,
                    instance_id = %instance.id,
                    "application undeployed"
                );
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(ConductorError::new(ErrorKind::Inventory, "cannot delete application")
                .with_param(instance.network_id.clone())
                .with_param(instance.id.clone())
                .caused_by(err)),
        }
    }

    async fn delete_reservation(&self, instance: &AppInstance) -> Result<(), InventoryError> {
        let result = self
            .inventory
            .delete_instance(&instance.network_id, &instance.id)
            .await;
        let outcome = match &result {
            Ok(()) => "success",
            Err(err) if err.is_not_found() => "success",
            Err(_) => "failure",
        };
        counter!("conductor_rollbacks_total", "outcome" => outcome).increment(1);
        match result {
            Err(err) if !err.is_not_found() => {
                error!(
                    network_id = %instance.network_id,
                    instance_id = %instance.id,
                    %err,
                    "rollback of instance reservation failed"
                );
                Err(err)
            }
            _ => {
                info!(
                    network_id = %instance.network_id,
                    instance_id = %instance.id,
                    "instance reservation rolled back"
                );
                Ok(())
            }
        }
    }

    async fn lock_name(&self, network_id: &str, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.name_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((network_id.to_string(), name.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    async fn ensure_name_free(&self, network_id: &str, name: &str) -> ConductorResult<()> {
        let instances = self
            .inventory
            .list_instances(network_id)
            .await
            .map_err(|err| {
                ConductorError::from_inventory("cannot retrieve applications", err)
                    .with_param(network_id)
            })?;
        if instances
            .iter()
            .any(|instance| instance.name == name && instance.status.is_live())
        {
            return Err(ConductorError::validation("application name already in use")
                .with_param(network_id)
                .with_param(name));
        }
        Ok(())
    }
}

fn store_error(message: &str, err: InventoryError) -> ConductorError {
    match err {
        err @ InventoryError::Transport { .. } => ConductorError::from_inventory(message, err),
        err => ConductorError::new(ErrorKind::Inventory, message).caused_by(err),
    }
}

async fn deadline<T>(
    operation: &'static str,
    timeout: Duration,
    call: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| AgentError::Timeout { operation, timeout })?
}

/// Deletes a reservation when the deploy future is dropped mid-flight.
struct RollbackGuard {
    inventory: DynInventory,
    network_id: String,
    instance_id: String,
    armed: bool,
}

impl RollbackGuard {
    fn arm(inventory: DynInventory, instance: &AppInstance) -> Self {
        Self {
            inventory,
            network_id: instance.network_id.clone(),
            instance_id: instance.id.clone(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(
                network_id = %self.network_id,
                instance_id = %self.instance_id,
                "deploy cancelled outside a runtime, reservation left behind"
            );
            return;
        };
        let inventory = self.inventory.clone();
        let network_id = std::mem::take(&mut self.network_id);
        let instance_id = std::mem::take(&mut self.instance_id);
        warn!(%network_id, %instance_id, "deploy cancelled, rolling back reservation");
        handle.spawn(async move {
            match inventory.delete_instance(&network_id, &instance_id).await {
                Ok(()) => {
                    counter!("conductor_rollbacks_total", "outcome" => "success").increment(1);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    counter!("conductor_rollbacks_total", "outcome" => "failure").increment(1);
                    error!(%network_id, %instance_id, %err, "cancelled deploy rollback failed");
                }
            }
        });
    }
}
