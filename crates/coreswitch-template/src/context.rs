//! Structured data a template is rendered against.

use coreswitch_codec::{Inbound, User};
use coreswitch_core::{AgentCapabilities, CoreEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TemplateError};

/// Facts about the agent a configuration is rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent host ID.
    pub id: String,
    /// Agent host name.
    pub name: String,
    /// Engine running on the agent.
    pub core_type: CoreEngine,
    /// Engine version, empty when unknown.
    #[serde(default)]
    pub core_version: String,
    /// Effective capability tokens.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl AgentInfo {
    /// Agent facts with the effective capability set of `caps`.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, caps: &AgentCapabilities) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            core_type: caps.core_type,
            core_version: caps.core_version.clone().unwrap_or_default(),
            capabilities: caps
                .effective()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Facts about the panel server issuing the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Public domain of the node.
    #[serde(default)]
    pub domain: String,
    /// Engine log level.
    #[serde(default)]
    pub log_level: String,
}

/// Canonical context before rendering.
///
/// The capability filter operates on this form; [`ConfigContext::to_render_value`]
/// turns it into the JSON the template sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigContext {
    /// Listeners to render.
    pub inbounds: Vec<Inbound>,
    /// Native outbound objects, passed through unchanged.
    pub outbounds: Vec<Value>,
    /// Users of the node.
    pub users: Vec<User>,
    /// Target agent.
    pub agent: AgentInfo,
    /// Issuing server.
    pub server: ServerInfo,
}

/// The render context together with findings from building it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    /// `{inbounds, outbounds, users, agent, server}` as JSON.
    pub value: Value,
    /// Fields dropped while serializing inbounds into the target engine.
    pub warnings: Vec<String>,
}

impl ConfigContext {
    /// Build the JSON context for the engine.
    ///
    /// Inbounds are serialized into the engine's native shape so templates
    /// can embed them directly.
    ///
    /// # Errors
    ///
    /// Returns an error if an inbound or the context cannot be encoded.
    pub fn to_render_value(&self, engine: CoreEngine) -> Result<RenderContext> {
        let native = coreswitch_codec::to_native(&self.inbounds, engine)?;

        let value = serde_json::json!({
            "inbounds": native.inbounds,
            "outbounds": self.outbounds,
            "users": encode(&self.users)?,
            "agent": encode(&self.agent)?,
            "server": encode(&self.server)?,
        });

        Ok(RenderContext {
            value,
            warnings: native.warnings,
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| TemplateError::Context(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use coreswitch_codec::Protocol;

    #[test]
    fn render_value_uses_native_inbounds() {
        let caps = AgentCapabilities::new(CoreEngine::SingBox, "1.8.0");
        let ctx = ConfigContext {
            inbounds: vec![Inbound::new(Protocol::Trojan, "t", 443)],
            outbounds: vec![serde_json::json!({"type": "direct", "tag": "direct"})],
            users: vec![User {
                name: "u".to_string(),
                ..User::default()
            }],
            agent: AgentInfo::new("id-1", "edge", &caps),
            server: ServerInfo::default(),
        };

        let rendered = ctx.to_render_value(CoreEngine::SingBox).unwrap();
        assert_eq!(rendered.value["inbounds"][0]["listen_port"], 443);
        assert_eq!(rendered.value["users"][0]["name"], "u");
        assert_eq!(rendered.value["agent"]["core_type"], "sing-box");
        assert!(rendered.value["agent"]["capabilities"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c == "reality"));
    }
}
