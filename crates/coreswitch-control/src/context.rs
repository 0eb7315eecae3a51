//! Node data that templates are rendered against.
//!
//! Listener definitions, users and outbounds belong to the node/user
//! domain, which lives outside the control plane. [`ContextProvider`] is the
//! seam to that domain; [`NodeProfile`] is a static implementation loaded
//! from a JSON document.

use coreswitch_codec::{Inbound, User};
use coreswitch_store::AgentHost;
use coreswitch_template::{AgentInfo, ConfigContext, ServerInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ControlError, Result};

/// Supplies the render context for an agent host.
pub trait ContextProvider: Send + Sync {
    /// Build the unfiltered context for a host.
    ///
    /// # Errors
    ///
    /// Returns an error if the node data cannot be loaded.
    fn context_for(&self, host: &AgentHost) -> Result<ConfigContext>;
}

/// A fixed node description shared by every host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProfile {
    /// Listeners to render.
    #[serde(default)]
    pub inbounds: Vec<Inbound>,
    /// Native outbound objects.
    #[serde(default)]
    pub outbounds: Vec<Value>,
    /// Users of the node; attached to every inbound that declares none.
    #[serde(default)]
    pub users: Vec<User>,
    /// Server facts.
    #[serde(default)]
    pub server: ServerInfo,
}

impl NodeProfile {
    /// Parse a profile from JSON.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if the document is malformed.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ControlError::Validation(format!("invalid node profile: {e}")))
    }
}

impl ContextProvider for NodeProfile {
    fn context_for(&self, host: &AgentHost) -> Result<ConfigContext> {
        let inbounds = self
            .inbounds
            .iter()
            .cloned()
            .map(|mut inbound| {
                if inbound.users.is_empty() && inbound_takes_users(&inbound) {
                    inbound.users.clone_from(&self.users);
                }
                inbound.with_derived_capabilities()
            })
            .collect();

        Ok(ConfigContext {
            inbounds,
            outbounds: self.outbounds.clone(),
            users: self.users.clone(),
            agent: AgentInfo::new(host.id.to_string(), &host.name, &host.agent_capabilities()),
            server: self.server.clone(),
        })
    }
}

/// Shadowsocks listeners without users run in single-password mode.
fn inbound_takes_users(inbound: &Inbound) -> bool {
    !(inbound.protocol == coreswitch_codec::Protocol::Shadowsocks && !inbound.password.is_empty())
}
