use std::time::Duration;

use serde::Deserialize;

pub const ENV_PREFIX: &str = "CONDUCTOR";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub inventory: InventoryConfig,
    pub log_aggregator: LogAggregatorConfig,
    pub agent: AgentConfig,
    pub placement: PlacementConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Base URL of the inventory service.
    pub address: String,
    /// Deadline for descriptor, cluster, node and instance reads.
    pub read_timeout_secs: u64,
    /// Deadline for instance add, update and delete.
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogAggregatorConfig {
    /// Base URL of the log aggregator.
    pub address: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Port every cluster agent listens on.
    pub port: u16,
    pub scheme: String,
    /// Accept self-signed agent certificates; development only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    pub start_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub pods_timeout_secs: u64,
    pub list_timeout_secs: u64,
    /// Stop is re-issued while the agent reports the workload still present.
    pub stop_poll_attempts: u32,
    pub stop_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlacementConfig {
    /// Only place on clusters matching the descriptor's supported cluster type.
    #[serde(default)]
    pub filter_by_cluster_type: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Reject a deploy whose name is held by a live instance of the network.
    /// Turn off to deploy the same name repeatedly, each call placing a new
    /// instance on the next cluster in rotation.
    #[serde(default = "default_true")]
    pub enforce_unique_names: bool,
    /// Fail deploys whose `arguments` do not parse instead of sending empty values.
    #[serde(default)]
    pub strict_arguments: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enforce_unique_names: true,
            strict_arguments: false,
        }
    }
}

impl InventoryConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_base_url("inventory.address", &self.address)?;
        if self.read_timeout_secs == 0 || self.write_timeout_secs == 0 {
            anyhow::bail!("inventory timeouts must be > 0");
        }
        Ok(())
    }
}

impl LogAggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_base_url("log_aggregator.address", &self.address)?;
        if self.timeout_secs == 0 {
            anyhow::bail!("log_aggregator.timeout_secs must be > 0");
        }
        Ok(())
    }
}

impl AgentConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn pods_timeout(&self) -> Duration {
        Duration::from_secs(self.pods_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("agent.port must be > 0");
        }
        if !matches!(self.scheme.as_str(), "http" | "https") {
            anyhow::bail!("agent.scheme must be http or https");
        }
        if self.start_timeout_secs == 0
            || self.stop_timeout_secs == 0
            || self.pods_timeout_secs == 0
            || self.list_timeout_secs == 0
        {
            anyhow::bail!("agent timeouts must be > 0");
        }
        if self.stop_poll_attempts == 0 {
            anyhow::bail!("agent.stop_poll_attempts must be > 0");
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: 30000,
            scheme: "https".into(),
            accept_invalid_certs: false,
            start_timeout_secs: 300,
            stop_timeout_secs: 30,
            pods_timeout_secs: 30,
            list_timeout_secs: 30,
            stop_poll_attempts: 60,
            stop_poll_interval_ms: 5000,
        }
    }
}

fn validate_base_url(field: &str, value: &str) -> anyhow::Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        anyhow::bail!("{field} cannot be empty");
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        anyhow::bail!("{field} must start with http:// or https://");
    }
    Ok(())
}

pub fn load() -> anyhow::Result<AppConfig> {
    let env = config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true);

    let agent = AgentConfig::default();
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(env)
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("metrics.host", "0.0.0.0")?
        .set_default("metrics.port", 9090)?
        .set_default("inventory.address", "http://127.0.0.1:8800")?
        .set_default("inventory.read_timeout_secs", 10u64)?
        .set_default("inventory.write_timeout_secs", 15u64)?
        .set_default("log_aggregator.address", "http://127.0.0.1:8900")?
        .set_default("log_aggregator.timeout_secs", 30u64)?
        .set_default("agent.port", agent.port)?
        .set_default("agent.scheme", agent.scheme.clone())?
        .set_default("agent.accept_invalid_certs", agent.accept_invalid_certs)?
        .set_default("agent.start_timeout_secs", agent.start_timeout_secs)?
        .set_default("agent.stop_timeout_secs", agent.stop_timeout_secs)?
        .set_default("agent.pods_timeout_secs", agent.pods_timeout_secs)?
        .set_default("agent.list_timeout_secs", agent.list_timeout_secs)?
        .set_default("agent.stop_poll_attempts", agent.stop_poll_attempts)?
        .set_default("agent.stop_poll_interval_ms", agent.stop_poll_interval_ms)?
        .set_default("placement.filter_by_cluster_type", false)?
        .set_default("features.enforce_unique_names", true)?
        .set_default("features.strict_arguments", false)?;

    let cfg = builder.build()?;
    let mut app: AppConfig = cfg.try_deserialize()?;
    app.inventory.address = app.inventory.address.trim().to_string();
    app.log_aggregator.address = app.log_aggregator.address.trim().to_string();
    app.agent.scheme = app.agent.scheme.trim().to_ascii_lowercase();
    if app.server.port == 0 {
        anyhow::bail!("server.port must be > 0");
    }
    app.inventory.validate()?;
    app.log_aggregator.validate()?;
    app.agent.validate()?;
    Ok(app)
}
