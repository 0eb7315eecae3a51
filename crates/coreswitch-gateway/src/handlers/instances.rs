//! Instance and switch endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use coreswitch_control::{
    AgentCoreInstance, CoreEngine, CorePlane, CreateInstanceRequest, InstanceId,
    SwitchCoreRequest, TemplateId,
};

use super::{config_text, parse_id, parse_instance_id};
use crate::error::{ApiError, ApiJson};
use crate::state::GatewayState;

/// Response for instance list.
#[derive(Debug, Serialize)]
pub struct ListInstancesResponse {
    /// Instances recorded for the host.
    pub instances: Vec<AgentCoreInstance>,
}

/// Request to start the first instance of an engine.
#[derive(Debug, Deserialize)]
pub struct CreateInstanceBody {
    /// Caller-chosen instance ID, unique per host.
    pub instance_id: InstanceId,
    /// Engine to run.
    pub core_type: CoreEngine,
    /// Explicit configuration, as a JSON string or inline JSON.
    #[serde(default)]
    pub config: Option<Value>,
    /// Template to render when no explicit configuration is given.
    #[serde(default)]
    pub config_template_id: Option<TemplateId>,
    /// Operator recorded in the audit trail.
    #[serde(default)]
    pub operator_id: Option<String>,
}

/// Request to replace a running instance.
#[derive(Debug, Deserialize)]
pub struct SwitchBody {
    /// Instance being replaced.
    pub from_instance_id: InstanceId,
    /// Instance to start.
    pub to_instance_id: InstanceId,
    /// Engine of the new instance.
    pub to_core_type: CoreEngine,
    /// Explicit configuration, as a JSON string or inline JSON.
    #[serde(default)]
    pub config: Option<Value>,
    /// Template to render when no explicit configuration is given.
    #[serde(default)]
    pub config_template_id: Option<TemplateId>,
    /// Operator recorded in the audit trail.
    #[serde(default)]
    pub operator_id: Option<String>,
}

/// List the instances of a host.
///
/// # Errors
///
/// Returns an error if the host is not found.
pub async fn list_instances<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("agent host", &agent_host_id)?;
    let instances = state.control.get_instances(&id).await?;
    Ok(Json(ListInstancesResponse { instances }))
}

/// Start the first instance of an engine on a host.
///
/// # Errors
///
/// Returns an error if the request is rejected or the agent fails to apply
/// the configuration.
pub async fn create_instance<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
    ApiJson(body): ApiJson<CreateInstanceBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let request = CreateInstanceRequest {
        agent_host_id: parse_id("agent host", &agent_host_id)?,
        instance_id: body.instance_id,
        core_type: body.core_type,
        config: config_text(body.config),
        config_template_id: body.config_template_id,
        operator_id: body.operator_id,
    };
    let instance = state.control.create_instance(request).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

/// Delete an instance from the agent and the local records.
///
/// # Errors
///
/// Returns an error if the instance is not found, busy, or the agent fails.
pub async fn delete_instance<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path((agent_host_id, instance_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("agent host", &agent_host_id)?;
    let instance_id = parse_instance_id(&instance_id)?;
    state.control.delete_instance(&id, &instance_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Switch a host to a new instance.
///
/// A remote failure is answered with `200 OK` and `success: false`; the
/// audit row carries the same outcome.
///
/// # Errors
///
/// Returns an error if the request is rejected before the agent is called.
pub async fn switch_core<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(agent_host_id): Path<String>,
    ApiJson(body): ApiJson<SwitchBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let request = SwitchCoreRequest {
        agent_host_id: parse_id("agent host", &agent_host_id)?,
        from_instance_id: Some(body.from_instance_id),
        to_instance_id: body.to_instance_id,
        to_core_type: body.to_core_type,
        config: config_text(body.config),
        config_template_id: body.config_template_id,
        operator_id: body.operator_id,
    };
    let result = state.control.switch_core(request).await?;
    Ok(Json(result))
}
