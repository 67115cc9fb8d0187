#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use common::api::ClusterStatus;
use conductor::{
    app_state::AppState,
    http::build_router,
    inventory::InMemoryInventory,
    metrics::init_metrics_recorder,
    orchestrator::{Orchestrator, OrchestratorSettings},
    test_support::{
        FakeClusterAgentFactory, StaticLogAggregator, fast_settings, seed_cluster,
        seed_descriptor,
    },
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const NETWORK: &str = "n1";
pub const DESCRIPTOR: &str = "d1";

pub struct TestApp {
    pub app: Router,
    pub inventory: InMemoryInventory,
    pub agents: FakeClusterAgentFactory,
    pub logs: StaticLogAggregator,
}

/// Clusters get master nodes at `10.0.0.1`, `10.0.0.2`, ... in slice order.
pub async fn setup_app(clusters: &[(&str, ClusterStatus)]) -> TestApp {
    setup_app_with(clusters, fast_settings()).await
}

pub async fn setup_app_with(
    clusters: &[(&str, ClusterStatus)],
    settings: OrchestratorSettings,
) -> TestApp {
    let inventory = InMemoryInventory::new();
    for (idx, (cluster_id, status)) in clusters.iter().enumerate() {
        seed_cluster(
            &inventory,
            NETWORK,
            cluster_id,
            *status,
            &format!("10.0.0.{}", idx + 1),
        )
        .await;
    }
    seed_descriptor(&inventory, NETWORK, DESCRIPTOR).await;

    let agents = FakeClusterAgentFactory::new();
    let logs = StaticLogAggregator::new(vec!["GET / 200".into(), "GET /health 200".into()]);
    let orchestrator = Orchestrator::new(
        Arc::new(inventory.clone()),
        Arc::new(agents.clone()),
        Arc::new(logs.clone()),
        settings,
    );
    let state = AppState {
        orchestrator,
        metrics_handle: init_metrics_recorder(),
    };

    TestApp {
        app: build_router().with_state(state),
        inventory,
        agents,
        logs,
    }
}

pub fn installed(ids: &[&'static str]) -> Vec<(&'static str, ClusterStatus)> {
    ids.iter().map(|id| (*id, ClusterStatus::Installed)).collect()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

pub async fn deploy(app: &Router, name: &str) -> (StatusCode, Value) {
    deploy_with(app, json!({"appDescriptorId": DESCRIPTOR, "name": name})).await
}

pub async fn deploy_with(app: &Router, body: Value) -> (StatusCode, Value) {
    send(
        app,
        json_request(&format!("/api/v0/app/{NETWORK}/deploy"), &body),
    )
    .await
}

pub async fn undeploy(app: &Router, instance_id: &str) -> (StatusCode, Value) {
    send(
        app,
        get_request(&format!("/api/v0/app/{NETWORK}/{instance_id}/undeploy")),
    )
    .await
}
