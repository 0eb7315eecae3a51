//! Domain types stored in the database.
//!
//! These types represent the persisted state of agent hosts, configuration
//! templates, core instances and the switch audit trail.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use coreswitch_core::{
    AgentCapabilities, AgentHostId, Capability, ConfigHash, CoreEngine, InstanceId, SwitchLogId,
    TemplateId,
};
use serde::{Deserialize, Serialize};

/// A remote agent host record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHost {
    /// Unique identifier for the host.
    pub id: AgentHostId,
    /// Human-readable name.
    pub name: String,
    /// RPC base address, e.g. `https://10.0.0.5:7443`.
    pub address: String,
    /// Bearer token presented to the agent.
    pub token: String,
    /// TLS settings for the RPC channel.
    #[serde(default)]
    pub tls: Option<AgentTlsConfig>,
    /// Engine running on the host.
    pub core_type: CoreEngine,
    /// Reported engine version.
    #[serde(default)]
    pub core_version: Option<String>,
    /// Self-reported capability set.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Build tags of the engine binary.
    #[serde(default)]
    pub build_tags: Vec<String>,
    /// Template assigned to this host, if any.
    #[serde(default)]
    pub config_template_id: Option<TemplateId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AgentHost {
    /// Capability view of this host.
    #[must_use]
    pub fn agent_capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            core_type: self.core_type,
            core_version: self.core_version.clone(),
            capabilities: self.capabilities.clone(),
            build_tags: self.build_tags.clone(),
        }
    }
}

/// TLS settings for the agent RPC channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTlsConfig {
    /// PEM-encoded CA certificate used to verify the agent.
    #[serde(default)]
    pub ca_cert_pem: Option<String>,
    /// Accept any certificate presented by the agent.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// An admin-authored configuration template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigTemplate {
    /// Unique identifier for the template.
    pub id: TemplateId,
    /// Human-readable name.
    pub name: String,
    /// Target engine the template renders for.
    pub core_type: CoreEngine,
    /// Raw template text.
    pub content: String,
    /// Minimum engine version required, empty for none.
    #[serde(default)]
    pub min_version: String,
    /// Capabilities the template relies on.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Version of the template context schema.
    pub schema_version: u32,
    /// Result of the last content validation.
    pub is_valid: bool,
    /// Validation failure messages joined by `; `, if any.
    #[serde(default)]
    pub validation_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Run state of a core instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// The instance is the active configuration on its host.
    Running,
    /// The instance was replaced; kept for history.
    Stopped,
}

/// A core instance on an agent host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCoreInstance {
    /// Host the instance runs on.
    pub agent_host_id: AgentHostId,
    /// Instance name, unique per host.
    pub instance_id: InstanceId,
    /// Engine of the instance.
    pub core_type: CoreEngine,
    /// Current run state.
    pub status: InstanceStatus,
    /// Template the configuration was rendered from.
    #[serde(default)]
    pub config_template_id: Option<TemplateId>,
    /// Hash of the exact configuration bytes sent to the agent.
    pub config_hash: ConfigHash,
    /// Ports the agent reported listening on.
    #[serde(default)]
    pub listen_ports: Vec<u16>,
    /// Last heartbeat reported for the instance.
    #[serde(default)]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Last error reported for the instance.
    #[serde(default)]
    pub error_message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Status of a switch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStatus {
    /// Row written, remote call not yet attempted.
    Pending,
    /// Remote call issued.
    InProgress,
    /// Remote call succeeded.
    Completed,
    /// Remote call failed, timed out or was cancelled.
    Failed,
}

impl SwitchStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row of one switch or instance-creation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCoreSwitchLog {
    /// Unique identifier, also the correlation ID of the attempt.
    pub id: SwitchLogId,
    /// Host the switch targets.
    pub agent_host_id: AgentHostId,
    /// Instance being replaced, absent for instance creation.
    #[serde(default)]
    pub from_instance_id: Option<InstanceId>,
    /// Instance being started.
    #[serde(default)]
    pub to_instance_id: Option<InstanceId>,
    /// Engine of the replaced instance.
    #[serde(default)]
    pub from_core_type: Option<CoreEngine>,
    /// Engine of the new instance.
    pub to_core_type: CoreEngine,
    /// Current status.
    pub status: SwitchStatus,
    /// Result or failure message.
    #[serde(default)]
    pub message: String,
    /// Operator who requested the switch.
    #[serde(default)]
    pub operator_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set once, on the terminal transition.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Filter for listing switch logs. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct SwitchLogFilter {
    /// Only logs of this host.
    pub agent_host_id: Option<AgentHostId>,
    /// Only logs with this status.
    pub status: Option<SwitchStatus>,
    /// Only logs created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only logs created before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Number of matching logs to skip.
    pub offset: usize,
    /// Maximum number of logs to return.
    pub limit: Option<usize>,
}

impl SwitchLogFilter {
    /// Whether a log matches the status and time-range criteria.
    #[must_use]
    pub fn matches(&self, log: &AgentCoreSwitchLog) -> bool {
        self.agent_host_id.map_or(true, |h| h == log.agent_host_id)
            && self.status.map_or(true, |s| s == log.status)
            && self.since.map_or(true, |t| log.created_at >= t)
            && self.until.map_or(true, |t| log.created_at < t)
    }
}
