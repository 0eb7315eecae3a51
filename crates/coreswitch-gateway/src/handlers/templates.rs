//! Configuration template endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use coreswitch_control::{
    ConfigTemplate, CoreEngine, CorePlane, CreateTemplateRequest, UpdateTemplateRequest,
};

use super::parse_id;
use crate::error::{ApiError, ApiJson};
use crate::state::GatewayState;

/// Response for template list.
#[derive(Debug, Serialize)]
pub struct ListTemplatesResponse {
    /// Stored templates.
    pub templates: Vec<ConfigTemplate>,
}

/// Template text to validate or preview.
#[derive(Debug, Deserialize)]
pub struct TemplateContentBody {
    /// Template text.
    pub content: String,
    /// Engine the template renders for.
    pub core_type: CoreEngine,
}

/// Rendered preview.
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    /// Output rendered against the sample context.
    pub rendered: String,
}

/// List templates.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_templates<C>(
    State(state): State<Arc<GatewayState<C>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let templates = state.control.list_templates().await?;
    Ok(Json(ListTemplatesResponse { templates }))
}

/// Create a template. Invalid content is stored with `is_valid: false`.
///
/// # Errors
///
/// Returns an error if the metadata is invalid.
pub async fn create_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    ApiJson(body): ApiJson<CreateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let template = state.control.create_template(body).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// Get a template.
///
/// # Errors
///
/// Returns an error if the template is not found.
pub async fn get_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(template_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("template", &template_id)?;
    let template = state.control.get_template(&id).await?;
    Ok(Json(template))
}

/// Update a template.
///
/// # Errors
///
/// Returns an error if the template is not found or the metadata is invalid.
pub async fn update_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(template_id): Path<String>,
    ApiJson(body): ApiJson<UpdateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("template", &template_id)?;
    let template = state.control.update_template(&id, body).await?;
    Ok(Json(template))
}

/// Delete a template.
///
/// # Errors
///
/// Returns an error if the template is not found or still assigned.
pub async fn delete_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(template_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("template", &template_id)?;
    state.control.delete_template(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate template text without storing it.
///
/// # Errors
///
/// Returns an error only for malformed requests; findings are in the report.
pub async fn validate_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    ApiJson(body): ApiJson<TemplateContentBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let report = state
        .control
        .validate_template(&body.content, body.core_type)
        .await?;
    Ok(Json(report))
}

/// Render template text against the sample context.
///
/// # Errors
///
/// Returns an error if the template does not render.
pub async fn preview_template<C>(
    State(state): State<Arc<GatewayState<C>>>,
    ApiJson(body): ApiJson<TemplateContentBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let rendered = state
        .control
        .preview_template(&body.content, body.core_type)
        .await?;
    Ok(Json(PreviewResponse { rendered }))
}
