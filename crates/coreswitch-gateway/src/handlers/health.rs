//! Liveness and store reachability.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use coreswitch_control::CorePlane;

use crate::state::GatewayState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when the store answers, `degraded` otherwise.
    pub status: &'static str,
    /// Gateway build version.
    pub version: &'static str,
    /// Registered agent hosts; absent when the store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_hosts: Option<usize>,
}

/// Report whether the gateway can read its store.
///
/// Answers `503 Service Unavailable` with `status: "degraded"` when the
/// host listing fails, so load balancers stop routing to this node.
pub async fn health<C>(State(state): State<Arc<GatewayState<C>>>) -> impl IntoResponse
where
    C: CorePlane + 'static,
{
    let version = env!("CARGO_PKG_VERSION");
    match state.control.list_agent_hosts().await {
        Ok(hosts) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version,
                agent_hosts: Some(hosts.len()),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not read the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    version,
                    agent_hosts: None,
                }),
            )
        }
    }
}
