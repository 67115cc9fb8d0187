use super::*;

pub fn router() -> Router<AppState> {
    Router::<AppState>::new().route("/ping", get(ping))
}

pub fn metrics_router() -> Router<AppState> {
    Router::<AppState>::new().route("/metrics", get(metrics))
}

#[utoipa::path(
    get,
    path = "/ping",
    responses((status = 200, description = "Liveness probe", body = OperationResponse)),
    tag = "system"
)]
pub(crate) async fn ping() -> Json<OperationResponse> {
    Json(OperationResponse::new("ping"))
}

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "Prometheus metrics", content_type = "text/plain")),
    tag = "system"
)]
pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}
