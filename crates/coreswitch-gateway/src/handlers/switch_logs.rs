//! Switch audit trail endpoints.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coreswitch_control::{AgentCoreSwitchLog, AgentHostId, CorePlane, SwitchLogFilter, SwitchStatus};

use super::parse_id;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Filter parameters for the audit trail.
#[derive(Debug, Default, Deserialize)]
pub struct SwitchLogQuery {
    /// Only rows of this host.
    #[serde(default)]
    pub agent_host_id: Option<AgentHostId>,
    /// Only rows in this status.
    #[serde(default)]
    pub status: Option<SwitchStatus>,
    /// Created at or after (RFC 3339).
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Created before (RFC 3339).
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size, capped by the server.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl From<SwitchLogQuery> for SwitchLogFilter {
    fn from(query: SwitchLogQuery) -> Self {
        Self {
            agent_host_id: query.agent_host_id,
            status: query.status,
            since: query.since,
            until: query.until,
            offset: query.offset,
            limit: query.limit,
        }
    }
}

/// A page of the audit trail.
#[derive(Debug, Serialize)]
pub struct ListSwitchLogsResponse {
    /// Rows on this page, newest first.
    pub switch_logs: Vec<AgentCoreSwitchLog>,
    /// Matching rows across all pages.
    pub total: usize,
}

/// Query the audit trail.
///
/// # Errors
///
/// Returns an error if the query is malformed.
pub async fn list_switch_logs<C>(
    State(state): State<Arc<GatewayState<C>>>,
    query: Result<Query<SwitchLogQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let Query(query) = query?;
    let (switch_logs, total) = state.control.get_switch_logs(query.into()).await?;
    Ok(Json(ListSwitchLogsResponse { switch_logs, total }))
}

/// Get one audit row.
///
/// # Errors
///
/// Returns an error if the row is not found.
pub async fn get_switch_log<C>(
    State(state): State<Arc<GatewayState<C>>>,
    Path(switch_log_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: CorePlane + 'static,
{
    let id = parse_id("switch log", &switch_log_id)?;
    let log = state.control.get_switch_log(&id).await?;
    Ok(Json(log))
}
