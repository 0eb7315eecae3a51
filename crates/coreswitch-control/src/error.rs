//! Error types for the control plane.
//!
//! Every error maps onto one class of the failure taxonomy exposed to
//! callers: validation, not found, conflict, remote, or internal.

use coreswitch_codec::CodecError;
use coreswitch_core::{AgentHostId, CoreError, InstanceId, SwitchLogId, TemplateId};
use coreswitch_store::SwitchStatus;
use coreswitch_template::TemplateError;
use thiserror::Error;

use crate::agent_client::RpcError;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The request is malformed or incomplete.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The requested agent host was not found.
    #[error("agent host not found: {0}")]
    AgentHostNotFound(AgentHostId),

    /// The requested template was not found.
    #[error("template not found: {0}")]
    TemplateNotFound(TemplateId),

    /// The requested instance was not found.
    #[error("instance {instance_id} not found on agent host {agent_host_id}")]
    InstanceNotFound {
        /// Host that was searched.
        agent_host_id: AgentHostId,
        /// Missing instance.
        instance_id: InstanceId,
    },

    /// The requested switch log was not found.
    #[error("switch log not found: {0}")]
    SwitchLogNotFound(SwitchLogId),

    /// An instance with this ID already exists on the host.
    #[error("instance {instance_id} already exists on agent host {agent_host_id}")]
    InstanceExists {
        /// Host of the instance.
        agent_host_id: AgentHostId,
        /// Duplicate instance.
        instance_id: InstanceId,
    },

    /// Another switch holds the instance.
    #[error("a switch is already in progress for instance {instance_id} on agent host {agent_host_id}")]
    SwitchInProgress {
        /// Host of the instance.
        agent_host_id: AgentHostId,
        /// Locked instance.
        instance_id: InstanceId,
    },

    /// The template cannot be used for the agent.
    #[error("template {template_id} is incompatible: {}", .reasons.join("; "))]
    Incompatible {
        /// Template that was checked.
        template_id: TemplateId,
        /// Hard incompatibilities.
        reasons: Vec<String>,
    },

    /// The template failed validation when it was last saved.
    #[error("template {template_id} is invalid: {reason}")]
    InvalidTemplate {
        /// Invalid template.
        template_id: TemplateId,
        /// Stored validation error.
        reason: String,
    },

    /// The template is still assigned to a host.
    #[error("template {template_id} is assigned to agent host {agent_host_id}")]
    TemplateInUse {
        /// Template that cannot be deleted.
        template_id: TemplateId,
        /// A host it is assigned to.
        agent_host_id: AgentHostId,
    },

    /// The rendered configuration failed final validation.
    #[error("rendered configuration is invalid: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// An instance creation reached the agent and failed.
    #[error("switch {switch_log_id} failed: {message}")]
    SwitchFailed {
        /// Audit row of the attempt.
        switch_log_id: SwitchLogId,
        /// Failure recorded in the audit row.
        message: String,
    },

    /// A switch log was asked to make an illegal status change.
    #[error("switch {switch_log_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Audit row being updated.
        switch_log_id: SwitchLogId,
        /// Current status.
        from: SwitchStatus,
        /// Requested status.
        to: SwitchStatus,
    },

    /// A direct agent call failed.
    #[error("agent call failed: {0}")]
    Remote(#[from] RpcError),

    /// Identifier or version parsing failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Configuration parsing or conversion failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Template compilation or rendering failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] coreswitch_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::InvalidConfig(_)
            | Self::Core(_)
            | Self::Codec(_)
            | Self::Template(_) => 400,
            Self::AgentHostNotFound(_)
            | Self::TemplateNotFound(_)
            | Self::InstanceNotFound { .. }
            | Self::SwitchLogNotFound(_) => 404,
            Self::InstanceExists { .. }
            | Self::SwitchInProgress { .. }
            | Self::Incompatible { .. }
            | Self::InvalidTemplate { .. }
            | Self::TemplateInUse { .. } => 409,
            Self::Remote(_) | Self::SwitchFailed { .. } => 502,
            Self::InvalidTransition { .. } | Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Whether this error means the addressed resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.http_status_code() == 404
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Core(_) => "invalid_request",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Codec(_) => "invalid_configuration_input",
            Self::Template(_) => "template_error",
            Self::AgentHostNotFound(_) => "agent_host_not_found",
            Self::TemplateNotFound(_) => "template_not_found",
            Self::InstanceNotFound { .. } => "instance_not_found",
            Self::SwitchLogNotFound(_) => "switch_log_not_found",
            Self::InstanceExists { .. } => "instance_exists",
            Self::SwitchInProgress { .. } => "switch_in_progress",
            Self::Incompatible { .. } => "incompatible_template",
            Self::InvalidTemplate { .. } => "invalid_template",
            Self::TemplateInUse { .. } => "template_in_use",
            Self::Remote(_) => "agent_unavailable",
            Self::SwitchFailed { .. } => "switch_failed",
            Self::InvalidTransition { .. } | Self::Store(_) | Self::Internal(_) => {
                "internal_error"
            }
        }
    }
}
