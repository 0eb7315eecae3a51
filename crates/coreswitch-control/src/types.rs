//! Request and response types for control plane operations.
//!
//! These types define the API contracts for agent hosts, templates, core
//! instances and switches.

use std::time::Duration;

use chrono::{DateTime, Utc};
use coreswitch_core::{
    AgentHostId, Capability, ConfigHash, CoreEngine, InstanceId, SwitchLogId, TemplateId,
};
use coreswitch_store::{AgentCoreInstance, AgentTlsConfig};
use serde::{Deserialize, Serialize};

/// Request to register or update an agent host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentHostRequest {
    /// Existing host to update; a new ID is generated when absent.
    #[serde(default)]
    pub id: Option<AgentHostId>,
    /// Human-readable name.
    pub name: String,
    /// RPC base address of the agent.
    pub address: String,
    /// Bearer token presented to the agent.
    #[serde(default)]
    pub token: String,
    /// TLS settings for the RPC channel.
    #[serde(default)]
    pub tls: Option<AgentTlsConfig>,
    /// Engine running on the host.
    pub core_type: CoreEngine,
    /// Reported engine version.
    #[serde(default)]
    pub core_version: Option<String>,
    /// Self-reported capability tokens; replaces the stored set.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Build tags of the engine binary.
    #[serde(default)]
    pub build_tags: Vec<String>,
}

impl RegisterAgentHostRequest {
    /// A request for a new host with no self-reported capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>, core_type: CoreEngine) -> Self {
        Self {
            id: None,
            name: name.into(),
            address: address.into(),
            token: String::new(),
            tls: None,
            core_type,
            core_version: None,
            capabilities: Vec::new(),
            build_tags: Vec::new(),
        }
    }

    /// Set the reported engine version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.core_version = Some(version.into());
        self
    }
}

/// Request to create a configuration template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    /// Display name.
    pub name: String,
    /// Engine the template renders for.
    pub core_type: CoreEngine,
    /// Template text.
    pub content: String,
    /// Minimum engine version, empty for none.
    #[serde(default)]
    pub min_version: String,
    /// Capabilities the template relies on.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Version of the context schema the template was written against.
    #[serde(default = "CreateTemplateRequest::default_schema_version")]
    pub schema_version: u32,
}

impl CreateTemplateRequest {
    const fn default_schema_version() -> u32 {
        1
    }

    /// A request with no version or capability requirements.
    #[must_use]
    pub fn new(name: impl Into<String>, core_type: CoreEngine, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core_type,
            content: content.into(),
            min_version: String::new(),
            capabilities: Vec::new(),
            schema_version: Self::default_schema_version(),
        }
    }
}

/// Partial update of a template; absent fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTemplateRequest {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New target engine.
    #[serde(default)]
    pub core_type: Option<CoreEngine>,
    /// New template text.
    #[serde(default)]
    pub content: Option<String>,
    /// New minimum version.
    #[serde(default)]
    pub min_version: Option<String>,
    /// New capability list.
    #[serde(default)]
    pub capabilities: Option<Vec<Capability>>,
    /// New schema version.
    #[serde(default)]
    pub schema_version: Option<u32>,
}

/// A configuration rendered for an agent host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedConfig {
    /// Template it was rendered from.
    pub template_id: TemplateId,
    /// Engine it targets.
    pub core_type: CoreEngine,
    /// Rendered configuration text.
    pub raw: String,
    /// Hash of `raw`.
    pub config_hash: ConfigHash,
    /// Degraded features, dropped fields and soft compatibility findings.
    pub warnings: Vec<String>,
}

/// Request to create the first instance of a configuration on a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    /// Target host.
    pub agent_host_id: AgentHostId,
    /// Name of the new instance, unique per host.
    pub instance_id: InstanceId,
    /// Engine to run.
    pub core_type: CoreEngine,
    /// Explicit configuration; wins over `config_template_id`.
    #[serde(default)]
    pub config: Option<String>,
    /// Template to render when no explicit configuration is given.
    #[serde(default)]
    pub config_template_id: Option<TemplateId>,
    /// Operator requesting the change.
    #[serde(default)]
    pub operator_id: Option<String>,
}

/// Request to replace an instance's configuration or engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCoreRequest {
    /// Target host.
    pub agent_host_id: AgentHostId,
    /// Instance being replaced, if any.
    #[serde(default)]
    pub from_instance_id: Option<InstanceId>,
    /// Instance to start.
    pub to_instance_id: InstanceId,
    /// Engine of the new instance.
    pub to_core_type: CoreEngine,
    /// Explicit configuration; wins over `config_template_id`.
    #[serde(default)]
    pub config: Option<String>,
    /// Template to render when no explicit configuration is given.
    #[serde(default)]
    pub config_template_id: Option<TemplateId>,
    /// Operator requesting the change.
    #[serde(default)]
    pub operator_id: Option<String>,
}

impl From<CreateInstanceRequest> for SwitchCoreRequest {
    fn from(request: CreateInstanceRequest) -> Self {
        Self {
            agent_host_id: request.agent_host_id,
            from_instance_id: None,
            to_instance_id: request.instance_id,
            to_core_type: request.core_type,
            config: request.config,
            config_template_id: request.config_template_id,
            operator_id: request.operator_id,
        }
    }
}

/// Outcome of a switch attempt.
///
/// Remote failures are reported here with `success == false` rather than as
/// errors; the audit row named by `switch_log_id` holds the same outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchResult {
    /// Whether the agent applied the configuration.
    pub success: bool,
    /// Audit row of the attempt.
    pub switch_log_id: SwitchLogId,
    /// Instance now running, on success.
    #[serde(default)]
    pub new_instance_id: Option<InstanceId>,
    /// Agent message on success.
    #[serde(default)]
    pub message: String,
    /// Failure reason, empty on success.
    #[serde(default)]
    pub error: String,
    /// When the audit row reached its terminal status.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Render warnings for the configuration that was sent.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Bookkeeping writes that failed after the agent answered.
    #[serde(default)]
    pub reconciliation_warnings: Vec<String>,
    /// Instance row written for the new instance, on success.
    #[serde(skip)]
    pub instance: Option<AgentCoreInstance>,
}

/// Configuration for the control plane service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Upper bound of one agent call (seconds).
    #[serde(default = "ControlConfig::default_rpc_timeout")]
    pub rpc_timeout_seconds: u64,
    /// TCP connect timeout for agent calls (seconds).
    #[serde(default = "ControlConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// TCP keepalive interval for agent connections (seconds).
    #[serde(default = "ControlConfig::default_keepalive")]
    pub keepalive_seconds: u64,
    /// Largest switch log page returned.
    #[serde(default = "ControlConfig::default_page_limit")]
    pub switch_log_page_limit: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_seconds: Self::default_rpc_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            keepalive_seconds: Self::default_keepalive(),
            switch_log_page_limit: Self::default_page_limit(),
        }
    }
}

impl ControlConfig {
    const fn default_rpc_timeout() -> u64 {
        30
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    const fn default_keepalive() -> u64 {
        60
    }

    const fn default_page_limit() -> usize {
        100
    }

    /// Agent call timeout.
    #[must_use]
    pub const fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }
}
