use crate::{
    app_state::AppState,
    error::{ApiResult, AppError},
    metrics::HttpMetricsLayer,
    telemetry::{request_id_from_extension, request_id_from_request},
};
use axum::{
    Json, Router,
    body::Body,
    extract::{Extension, Path, State},
    http::{HeaderName, Method, Request, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::{get, post},
};
use common::api::{
    AppInstance, ApplicationPort, DeployRequest, ErrorResponse, InstanceStatus, LogEntries,
    OperationResponse, StorageType,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, info_span, warn};
use utoipa::{Modify, OpenApi};

mod apps;
mod error_mapper;
mod system;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build_router() -> Router<AppState> {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                info_span!(
                    "http",
                    method = %req.method(),
                    path = %req.uri().path(),
                    request_id = request_id_from_request(req).unwrap_or_default(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(HttpMetricsLayer)
        .layer(cors_layer());

    Router::<AppState>::new()
        .merge(system::router())
        .merge(apps::router())
        .layer(middleware_stack)
}

pub fn build_metrics_router() -> Router<AppState> {
    system::metrics_router()
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([HeaderName::from_static("x-requested-with"), CONTENT_TYPE])
}

#[derive(OpenApi)]
#[openapi(
    paths(
        system::ping,
        system::metrics,
        apps::deploy,
        apps::undeploy,
        apps::logs,
        apps::list_instances,
    ),
    components(schemas(
        AppInstance,
        ApplicationPort,
        DeployRequest,
        ErrorResponse,
        InstanceStatus,
        LogEntries,
        OperationResponse,
        StorageType,
    )),
    tags(
        (name = "system", description = "Liveness and metrics"),
        (name = "apps", description = "Application deployment lifecycle"),
    ),
    modifiers(&InfoAddon)
)]
pub struct ApiDoc;

struct InfoAddon;

impl Modify for InfoAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = "Conductor Orchestration API".to_string();
        openapi.info.version = crate::version::FULL_VERSION.to_string();
    }
}
