//! Agent host registration.

use std::collections::BTreeSet;

use chrono::Utc;
use coreswitch_core::{parse_version, AgentHostId, CoreError};
use coreswitch_store::{AgentHost, Store};

use crate::error::{ControlError, Result};
use crate::types::RegisterAgentHostRequest;

/// Register a host, or replace the connection and capability report of an
/// existing one.
///
/// Re-registration keeps the original `created_at` and template assignment.
/// A self-reported capability list replaces the stored set.
///
/// # Errors
///
/// Returns `ControlError::Validation` for a blank name or address, and a
/// version error for an unparsable `core_version`.
pub fn register_agent_host<S: Store>(store: &S, request: RegisterAgentHostRequest) -> Result<AgentHost> {
    if request.name.trim().is_empty() {
        return Err(ControlError::Validation("agent host name is required".to_string()));
    }
    if request.address.trim().is_empty() {
        return Err(ControlError::Validation("agent host address is required".to_string()));
    }
    let core_version = match request.core_version.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(version) => {
            parse_version(version).map_err(CoreError::from)?;
            Some(version.to_string())
        }
    };

    let id = request.id.unwrap_or_else(AgentHostId::generate);
    let existing = store.get_agent_host(&id)?;
    let now = Utc::now();

    let host = AgentHost {
        id,
        name: request.name,
        address: request.address.trim().to_string(),
        token: request.token,
        tls: request.tls,
        core_type: request.core_type,
        core_version,
        capabilities: request.capabilities.into_iter().collect::<BTreeSet<_>>(),
        build_tags: request.build_tags,
        config_template_id: existing.as_ref().and_then(|h| h.config_template_id),
        created_at: existing.as_ref().map_or(now, |h| h.created_at),
        updated_at: now,
    };
    store.put_agent_host(&host)?;

    tracing::info!(
        agent_host_id = %host.id,
        core_type = %host.core_type,
        core_version = host.core_version.as_deref().unwrap_or("unknown"),
        updated = existing.is_some(),
        "Registered agent host"
    );

    Ok(host)
}

/// Get an agent host by ID.
///
/// # Errors
///
/// Returns `ControlError::AgentHostNotFound` if it doesn't exist.
pub fn get_agent_host<S: Store>(store: &S, id: &AgentHostId) -> Result<AgentHost> {
    store
        .get_agent_host(id)?
        .ok_or(ControlError::AgentHostNotFound(*id))
}
