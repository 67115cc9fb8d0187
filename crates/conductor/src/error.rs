use std::fmt;

use axum::http::StatusCode;
use tracing::error;

use crate::{agent::AgentError, inventory::InventoryError, logs::LogAggregatorError};

/// Machine readable classification of a conductor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    DescriptorNotFound,
    Conflict,
    NoEligibleCluster,
    NoNode,
    Remote,
    Inventory,
    Transport,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DescriptorNotFound => "descriptor_not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NoEligibleCluster => "no_eligible_cluster",
            ErrorKind::NoNode => "no_node",
            ErrorKind::Remote => "remote",
            ErrorKind::Inventory => "inventory",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure surfaced by the orchestrator and placement engine.
///
/// Carries the kind, a message, free-form diagnostic parameters, the chained
/// cause and, when a compensation step failed too, the rollback error.
#[derive(Debug)]
pub struct ConductorError {
    pub kind: ErrorKind,
    pub message: String,
    pub params: Vec<String>,
    pub source: Option<anyhow::Error>,
    pub rollback: Option<anyhow::Error>,
}

impl fmt::Display for ConductorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConductorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| AsRef::<dyn std::error::Error + 'static>::as_ref(err))
    }
}

pub type ConductorResult<T> = std::result::Result<T, ConductorError>;

impl ConductorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            params: Vec::new(),
            source: None,
            rollback: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn caused_by(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_rollback_failure(mut self, rollback: impl Into<anyhow::Error>) -> Self {
        self.rollback = Some(rollback.into());
        self
    }

    /// Full diagnostic text including params, cause chain and rollback failure.
    pub fn detail(&self) -> String {
        let mut out = format!("{}: {}", self.kind, self.message);
        if !self.params.is_empty() {
            out.push_str(&format!(" [{}]", self.params.join(", ")));
        }
        if let Some(source) = &self.source {
            out.push_str(&format!("; caused by: {source:#}"));
        }
        if let Some(rollback) = &self.rollback {
            out.push_str(&format!("; rollback failed: {rollback:#}"));
        }
        out
    }

    /// Maps an inventory failure, keeping `not_found` and `validation` visible
    /// and folding service-side failures into `inventory`.
    pub fn from_inventory(message: impl Into<String>, err: InventoryError) -> Self {
        let kind = match &err {
            InventoryError::NotFound { .. } => ErrorKind::NotFound,
            InventoryError::Validation { .. } => ErrorKind::Validation,
            InventoryError::Conflict { .. } => ErrorKind::Conflict,
            InventoryError::Transport { .. } => ErrorKind::Transport,
            InventoryError::Service { .. } => ErrorKind::Inventory,
        };
        Self::new(kind, message).caused_by(err)
    }

    /// Every cluster agent failure surfaces as `remote` with the cause preserved.
    pub fn from_agent(message: impl Into<String>, err: AgentError) -> Self {
        Self::new(ErrorKind::Remote, message).caused_by(err)
    }

    pub fn from_log_aggregator(message: impl Into<String>, err: LogAggregatorError) -> Self {
        Self::new(ErrorKind::Remote, message).caused_by(err)
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: ErrorKind::Validation.as_str(),
            message: msg.into(),
        }
    }
}

impl From<ConductorError> for AppError {
    fn from(err: ConductorError) -> Self {
        crate::telemetry::record_error_metrics(err.kind);
        if err.kind.status().is_server_error() {
            error!(kind = %err.kind, detail = %err.detail(), "request failed");
        }
        Self {
            status: err.kind.status(),
            code: err.kind.as_str(),
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_validation_maps_to_bad_request() {
        assert_eq!(ErrorKind::Validation.status(), StatusCode::BAD_REQUEST);
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::DescriptorNotFound,
            ErrorKind::NoEligibleCluster,
            ErrorKind::NoNode,
            ErrorKind::Remote,
            ErrorKind::Inventory,
            ErrorKind::Transport,
            ErrorKind::Internal,
        ] {
            assert_eq!(kind.status(), StatusCode::INTERNAL_SERVER_ERROR, "{kind}");
        }
    }

    #[test]
    fn inventory_not_found_keeps_not_found_kind() {
        let err = ConductorError::from_inventory(
            "cannot retrieve application",
            InventoryError::NotFound {
                resource: "instance i1".into(),
            },
        );
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.source.is_some());
    }

    #[test]
    fn detail_includes_params_cause_and_rollback() {
        let err = ConductorError::new(ErrorKind::Remote, "cannot start application")
            .with_param("n1")
            .with_param("app1")
            .caused_by(anyhow::anyhow!("connection refused"))
            .with_rollback_failure(anyhow::anyhow!("inventory down"));

        let detail = err.detail();
        assert!(detail.starts_with("remote: cannot start application [n1, app1]"));
        assert!(detail.contains("caused by: connection refused"));
        assert!(detail.contains("rollback failed: inventory down"));
    }

    #[test]
    fn app_error_from_conductor_error_uses_kind_as_code() {
        let app: AppError = ConductorError::validation("name is required").into();
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "validation");
        assert_eq!(app.message, "name is required");

        let app: AppError = ConductorError::new(ErrorKind::NoEligibleCluster, "no available clusters").into();
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code, "no_eligible_cluster");
    }
}
