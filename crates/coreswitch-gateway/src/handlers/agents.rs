//! Agent host endpoints.
//!
//! Registration, capability discovery, template assignment and config
//! generation.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coreswitch_control::{
    AgentHost, AgentHostId, CoreEngine, CoreInfo, CorePlane, RegisterAgentHostRequest, TemplateId,
};
use coreswitch_core::Capability;

use super::parse_id;
use crate::error::{ApiError, ApiJson};
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a single agent host. The RPC token is never returned.
#[derive(Debug, Serialize)]
pub struct AgentHostResponse {
    /// Host ID.
    pub id: AgentHostId,
    /// Human-readable name.
    pub name: String,
    /// RPC base address.
    pub address: String,
    /// Whether a bearer token is configured.
    pub has_token: bool,
    /// Whether the RPC channel skips certificate verification.
    pub insecure_skip_verify: bool,
    /// Engine running on the host.
    pub core_type: CoreEngine,
    /// Reported engine version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_version: Option<String>,
    /// Self-reported capabilities.
    pub capabilities: BTreeSet<Capability>,
    /// Capabilities used for compatibility decisions.
    pub effective_capabilities: BTreeSet<Capability>,
    /// Build tags of the engine binary.
    pub build_tags: Vec<String>,
    /// Assigned template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_template_id: Option<TemplateId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<AgentHost> for AgentHostResponse {
    fn from(host: AgentHost) -> Self {
        let effective_capabilities = host.agent_capabilities().effective();
        Self {
            id: host.id,
            name: host.name,
            address: host.address,
            has_token: !host.token.is_empty(),
            insecure_skip_verify: host.tls.as_ref().is_some_and(|t| t.insecure_skip_verify),
            core_type: host.core_type,
            core_version: host.core_version,
            capabilities: host.capabilities,
            effective_capabilities,
            build_tags: host.build_tags,
            config_template_id: host.config_template_id,
            created_at: host.created_at,
            updated_at: host.updated_at,
        }
    }
}

/// Response for host list.
#[derive(Debug, Serialize)]
pub struct ListAgentHostsResponse {
    /// Registered hosts.
    pub agents: Vec<AgentHostResponse>,
}

/// Response for core discovery.
#[derive(Debug, Serialize)]
pub struct CoresResponse {
    /// Engines installed on the agent.
    pub cores: Vec<CoreInfo>,
}

/// Request to assign a template; `null` clears the assignment.
#[derive(Debug, Deserialize)]
pub struct AssignTemplateBody {
    /// Template to assign.
    #[serde(default)]
    pub template_id: Option<TemplateId>,
}

/// Query for a compatibility check.
#[derive(Debug, Deserialize)]
pub struct CompatibilityQuery {
    /// Template to check.
    pub template_id: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register or update an agent host.
///
/// # Errors
///
/// Returns an error if the request is invalid.
pub async fn register_agent_host<C>(
    State(state): State<Arc<GatewayState<C>>>,
    ApiJson(body): ApiJson<RegisterAgentHostRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let host = state.control.register_agent_host(body).await?;
    Ok((StatusCode::CREATED, Json(AgentHostResponse::from(host))))
}

/// List all agent hosts.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_agent_hosts<C>(
    State(state): State<Arc<GatewayState<C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let agents = state
        .control
        .list_agent_hosts()
        .await?
        .into_iter()
        .map(AgentHostResponse::from)
        .collect();
    Ok(Json(ListAgentHostsResponse { agents }))
}

/// Get an agent host.
///
/// # Errors
///
/// Returns an error if the host is not found.
pub async fn get_agent_host<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("agent host", &agent_host_id)?;
    let host = state.control.get_agent_host(&id).await?;
    Ok(Json(AgentHostResponse::from(host)))
}

/// List the engines installed on an agent.
///
/// # Errors
///
/// Returns an error if the host is not found or the agent is unreachable.
pub async fn get_cores<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("agent host", &agent_host_id)?;
    let cores = state.control.get_cores(&id).await?;
    Ok(Json(CoresResponse { cores }))
}

/// Assign a template to a host. Incompatibility is reported, not refused.
///
/// # Errors
///
/// Returns an error if the host or template is not found.
pub async fn assign_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
    ApiJson(body): ApiJson<AssignTemplateBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("agent host", &agent_host_id)?;
    let compatibility = state.control.assign_template(&id, body.template_id).await?;
    Ok(Json(compatibility))
}

/// Check a template against a host.
///
/// # Errors
///
/// Returns an error if the host or template is not found.
pub async fn check_compatibility<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
    query: Result<Query<CompatibilityQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let Query(query) = query?;
    let id = parse_id("agent host", &agent_host_id)?;
    let template_id = parse_id("template", &query.template_id)?;
    let compatibility = state
        .control
        .check_template_compatibility(&id, &template_id)
        .await?;
    Ok(Json(compatibility))
}

/// Render the host's assigned template; `204 No Content` without one.
///
/// # Errors
///
/// Returns an error if the host is not found or the template cannot be
/// rendered for it.
pub async fn generate_config<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
) -> Result<Response, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("agent host", &agent_host_id)?;
    Ok(match state.control.generate_config(&id).await? {
        Some(generated) => Json(generated).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
