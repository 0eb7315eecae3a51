//! Configuration conversion endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use coreswitch_control::CorePlane;

use super::config_text;
use crate::error::{ApiError, ApiJson};
use crate::state::GatewayState;

/// Request to convert a configuration between engines.
#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    /// Engine the input is written for.
    pub source: String,
    /// Engine to convert to.
    pub target: String,
    /// Input configuration, as a JSON string or inline JSON.
    #[serde(default)]
    pub config: Option<Value>,
}

/// Convert a configuration; dropped fields are listed in `warnings`.
///
/// # Errors
///
/// Returns an error for unknown engines or unparsable input.
pub async fn convert_config<C>(
    State(state): State<Arc<GatewayState<C>>>,
    ApiJson(body): ApiJson<ConvertBody>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let raw = config_text(body.config).unwrap_or_default();
    let converted = state
        .control
        .convert_config(&body.source, &body.target, &raw)
        .await?;
    Ok(Json(converted))
}
