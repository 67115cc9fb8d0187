use metrics_exporter_prometheus::PrometheusHandle;

use crate::orchestrator::Orchestrator;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub metrics_handle: PrometheusHandle,
}
