pub mod agent;
pub mod app_state;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod inventory;
pub mod logs;
pub mod metrics;
pub mod openapi;
pub mod orchestrator;
pub mod scheduler;
pub mod telemetry;
#[cfg(any(test, feature = "testkit"))]
pub mod test_support;
pub mod validation;
pub mod version;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

use std::{env, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    agent::HttpClusterAgentFactory,
    app_state::AppState,
    inventory::HttpInventory,
    logs::HttpLogAggregator,
    metrics::{init_metrics_recorder, record_build_info},
    orchestrator::{Orchestrator, OrchestratorSettings},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    Serve,
    CheckConfig,
}

pub fn parse_command() -> Result<CommandMode> {
    let mut args = env::args().skip(1);
    let Some(first) = args.next() else {
        return Ok(CommandMode::Serve);
    };

    match first.as_str() {
        "--check-config" | "check-config" => Ok(CommandMode::CheckConfig),
        "--help" | "-h" => {
            println!(
                "Usage: conductor [--check-config]\n\
                 Run without arguments to start the server. Configuration is read from\n\
                 ./config.{{toml,yaml,json}} and CONDUCTOR__<SECTION>__<KEY> variables."
            );
            std::process::exit(0);
        }
        other => anyhow::bail!("unknown argument: {other}"),
    }
}

pub async fn run(mode: CommandMode) -> Result<()> {
    match mode {
        CommandMode::Serve => run_with_shutdown(shutdown_signal()).await,
        CommandMode::CheckConfig => {
            let app_config = config::load()?;
            info!(
                inventory = %app_config.inventory.address,
                log_aggregator = %app_config.log_aggregator.address,
                agent_port = app_config.agent.port,
                agent_scheme = %app_config.agent.scheme,
                "configuration is valid"
            );
            Ok(())
        }
    }
}

/// Wires the collaborators from configuration.
pub fn build_state(app_config: &config::AppConfig) -> Result<AppState> {
    let inventory = HttpInventory::new(&app_config.inventory)?;
    let agents = HttpClusterAgentFactory::new(&app_config.agent)?;
    let logs = HttpLogAggregator::new(&app_config.log_aggregator)?;
    let orchestrator = Orchestrator::new(
        Arc::new(inventory),
        Arc::new(agents),
        Arc::new(logs),
        OrchestratorSettings::from_config(app_config),
    );
    Ok(AppState {
        orchestrator,
        metrics_handle: init_metrics_recorder(),
    })
}

pub async fn run_with_shutdown<S>(shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app_config = config::load()?;
    let state = build_state(&app_config)?;
    record_build_info();
    info!(
        inventory = %app_config.inventory.address,
        log_aggregator = %app_config.log_aggregator.address,
        agent_port = app_config.agent.port,
        filter_by_cluster_type = app_config.placement.filter_by_cluster_type,
        enforce_unique_names = app_config.features.enforce_unique_names,
        strict_arguments = app_config.features.strict_arguments,
        "conductor configured"
    );

    let api_addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid listen address: {}", err))?;
    let metrics_addr: SocketAddr =
        format!("{}:{}", app_config.metrics.host, app_config.metrics.port)
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid metrics listen address: {}", err))?;

    let app = http::build_router().with_state(state.clone());
    let metrics_app = http::build_metrics_router().with_state(state);

    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    info!(%api_addr, "conductor listening");
    info!(%metrics_addr, "conductor metrics listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx_for_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown.await;
        let _ = shutdown_tx_for_signal.send(true);
    });

    let mut api_shutdown = shutdown_rx.clone();
    let mut metrics_shutdown = shutdown_rx;

    let mut api_task = tokio::spawn(async move {
        axum::serve(api_listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await
    });

    let mut metrics_task = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move {
                let _ = metrics_shutdown.changed().await;
            })
            .await
    });

    tokio::select! {
        res = &mut api_task => {
            let _ = shutdown_tx.send(true);
            res.map_err(|err| anyhow::anyhow!("conductor task failed: {err}"))?
                .map_err(|err| anyhow::anyhow!("conductor server failed: {err}"))?;
            metrics_task
                .await
                .map_err(|err| anyhow::anyhow!("conductor metrics task failed: {err}"))?
                .map_err(|err| anyhow::anyhow!("conductor metrics server failed: {err}"))?;
        }
        res = &mut metrics_task => {
            let _ = shutdown_tx.send(true);
            res.map_err(|err| anyhow::anyhow!("conductor metrics task failed: {err}"))?
                .map_err(|err| anyhow::anyhow!("conductor metrics server failed: {err}"))?;
            api_task
                .await
                .map_err(|err| anyhow::anyhow!("conductor task failed: {err}"))?
                .map_err(|err| anyhow::anyhow!("conductor server failed: {err}"))?;
        }
    }

    info!("conductor stopped");
    Ok(())
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
}
