use super::*;
use axum::extract::rejection::JsonRejection;
use tower_http::limit::RequestBodyLimitLayer;

const DEPLOY_BODY_LIMIT: usize = 64 * 1024;

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route(
            "/api/v0/app/{network_id}/deploy",
            post(deploy).layer(RequestBodyLimitLayer::new(DEPLOY_BODY_LIMIT)),
        )
        .route("/api/v0/app/{network_id}/list", get(list_instances))
        .route(
            "/api/v0/app/{network_id}/{instance_id}/undeploy",
            get(undeploy),
        )
        .route("/api/v0/app/{network_id}/{instance_id}/logs", get(logs))
}

#[utoipa::path(
    post,
    path = "/api/v0/app/{network_id}/deploy",
    params(("network_id" = String, Path, description = "Network to deploy into")),
    request_body = DeployRequest,
    responses(
        (status = 200, description = "Instance deployed and ready", body = AppInstance),
        (status = 400, description = "Invalid deploy request", body = ErrorResponse),
        (status = 500, description = "Placement, remote or inventory failure", body = ErrorResponse)
    ),
    tag = "apps"
)]
pub(crate) async fn deploy(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
    request_id: Option<Extension<RequestId>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> ApiResult<Json<AppInstance>> {
    let request_id = request_id_from_extension(request_id);
    let Json(request) = payload.map_err(|rejection| {
        warn!(?request_id, %network_id, %rejection, "malformed deploy request");
        AppError::bad_request(rejection.body_text())
    })?;
    info!(
        ?request_id,
        %network_id,
        name = %request.name,
        descriptor_id = %request.descriptor_id,
        "deploy requested"
    );

    let instance = state.orchestrator.deploy(&network_id, request).await?;
    Ok(Json(instance))
}

#[utoipa::path(
    get,
    path = "/api/v0/app/{network_id}/{instance_id}/undeploy",
    params(
        ("network_id" = String, Path, description = "Network of the instance"),
        ("instance_id" = String, Path, description = "Instance to undeploy")
    ),
    responses(
        (status = 200, description = "Instance undeployed or already gone", body = OperationResponse),
        (status = 500, description = "Remote or inventory failure", body = ErrorResponse)
    ),
    tag = "apps"
)]
pub(crate) async fn undeploy(
    State(state): State<AppState>,
    Path((network_id, instance_id)): Path<(String, String)>,
    request_id: Option<Extension<RequestId>>,
) -> ApiResult<Json<OperationResponse>> {
    let request_id = request_id_from_extension(request_id);
    info!(?request_id, %network_id, %instance_id, "undeploy requested");

    state.orchestrator.undeploy(&network_id, &instance_id).await?;
    Ok(Json(OperationResponse::new("undeploy")))
}

#[utoipa::path(
    get,
    path = "/api/v0/app/{network_id}/{instance_id}/logs",
    params(
        ("network_id" = String, Path, description = "Network of the instance"),
        ("instance_id" = String, Path, description = "Instance whose logs are fetched")
    ),
    responses(
        (status = 200, description = "Log lines of the instance pods", body = LogEntries),
        (status = 500, description = "Unknown instance, remote or aggregator failure", body = ErrorResponse)
    ),
    tag = "apps"
)]
pub(crate) async fn logs(
    State(state): State<AppState>,
    Path((network_id, instance_id)): Path<(String, String)>,
) -> ApiResult<Json<LogEntries>> {
    let entries = state.orchestrator.logs(&network_id, &instance_id).await?;
    Ok(Json(LogEntries { entries }))
}

#[utoipa::path(
    get,
    path = "/api/v0/app/{network_id}/list",
    params(("network_id" = String, Path, description = "Network to list")),
    responses(
        (status = 200, description = "Instances of the network", body = [AppInstance]),
        (status = 500, description = "Inventory failure", body = ErrorResponse)
    ),
    tag = "apps"
)]
pub(crate) async fn list_instances(
    State(state): State<AppState>,
    Path(network_id): Path<String>,
) -> ApiResult<Json<Vec<AppInstance>>> {
    let instances = state.orchestrator.list_instances(&network_id).await?;
    Ok(Json(instances))
}
