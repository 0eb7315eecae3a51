//! Control plane service implementation.
//!
//! This module provides the [`CorePlane`] trait and the [`CorePlaneService`]
//! implementation that coordinates agent hosts, templates and switches.

use std::sync::Arc;

use async_trait::async_trait;
use coreswitch_codec::Converted;
use coreswitch_core::{AgentHostId, Compatibility, CoreEngine, InstanceId, SwitchLogId, TemplateId};
use coreswitch_store::{
    AgentCoreInstance, AgentCoreSwitchLog, AgentHost, ConfigTemplate, Store, StoreError,
    SwitchLogFilter,
};
use coreswitch_template::ValidationReport;
use tokio_util::sync::CancellationToken;

use crate::agent_client::{AgentClient, AgentClientFactory, AgentEndpoint, CoreInfo, RpcError};
use crate::context::ContextProvider;
use crate::error::{ControlError, Result};
use crate::hosts;
use crate::locks::InstanceLocks;
use crate::switch::SwitchKind;
use crate::templates;
use crate::types::{
    ControlConfig, CreateInstanceRequest, CreateTemplateRequest, GeneratedConfig,
    RegisterAgentHostRequest, SwitchCoreRequest, SwitchResult, UpdateTemplateRequest,
};

/// Trait defining the control plane operations.
#[async_trait]
pub trait CorePlane: Send + Sync {
    // =========================================================================
    // Agent Hosts
    // =========================================================================

    /// Register or update an agent host.
    async fn register_agent_host(&self, request: RegisterAgentHostRequest) -> Result<AgentHost>;

    /// Get an agent host by ID.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::AgentHostNotFound` if the host doesn't exist.
    async fn get_agent_host(&self, id: &AgentHostId) -> Result<AgentHost>;

    /// List all agent hosts.
    async fn list_agent_hosts(&self) -> Result<Vec<AgentHost>>;

    /// Ask an agent which engines it has installed.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Remote` if the agent cannot be reached.
    async fn get_cores(&self, id: &AgentHostId) -> Result<Vec<CoreInfo>>;

    // =========================================================================
    // Instances and Switches
    // =========================================================================

    /// List the instances recorded for a host.
    async fn get_instances(&self, id: &AgentHostId) -> Result<Vec<AgentCoreInstance>>;

    /// Start the first instance of an engine on a host.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InstanceExists` for a duplicate instance ID and
    /// `ControlError::SwitchFailed` if the agent did not apply the
    /// configuration; the audit row records the failure either way.
    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<AgentCoreInstance>;

    /// Remove an instance from the agent and from the local records.
    async fn delete_instance(&self, id: &AgentHostId, instance_id: &InstanceId) -> Result<()>;

    /// Replace a running instance with a new configuration.
    ///
    /// A remote failure is not an error: it is returned with
    /// `success == false` and recorded in the audit row.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected before the audit row is
    /// written.
    async fn switch_core(&self, request: SwitchCoreRequest) -> Result<SwitchResult>;

    /// Like [`CorePlane::switch_core`], abandoning the remote call when
    /// `cancel` fires.
    async fn switch_core_with_cancel(
        &self,
        request: SwitchCoreRequest,
        cancel: CancellationToken,
    ) -> Result<SwitchResult>;

    /// Query the switch audit trail, newest first, with the total match count.
    async fn get_switch_logs(&self, filter: SwitchLogFilter) -> Result<(Vec<AgentCoreSwitchLog>, usize)>;

    /// Get one switch audit row.
    async fn get_switch_log(&self, id: &SwitchLogId) -> Result<AgentCoreSwitchLog>;

    // =========================================================================
    // Conversion and Templates
    // =========================================================================

    /// Convert a configuration between engines.
    async fn convert_config(&self, source: &str, target: &str, raw: &str) -> Result<Converted>;

    /// Create a template.
    async fn create_template(&self, request: CreateTemplateRequest) -> Result<ConfigTemplate>;

    /// Update a template.
    async fn update_template(&self, id: &TemplateId, request: UpdateTemplateRequest) -> Result<ConfigTemplate>;

    /// Get a template.
    async fn get_template(&self, id: &TemplateId) -> Result<ConfigTemplate>;

    /// List all templates.
    async fn list_templates(&self) -> Result<Vec<ConfigTemplate>>;

    /// Delete an unassigned template.
    async fn delete_template(&self, id: &TemplateId) -> Result<()>;

    /// Validate template content without storing it.
    async fn validate_template(&self, content: &str, engine: CoreEngine) -> Result<ValidationReport>;

    /// Render template content against the built-in sample context.
    async fn preview_template(&self, content: &str, engine: CoreEngine) -> Result<String>;

    /// Assign a template to a host, or clear the assignment.
    async fn assign_template(&self, id: &AgentHostId, template_id: Option<TemplateId>) -> Result<Compatibility>;

    /// Check a template against a host's capabilities.
    async fn check_template_compatibility(
        &self,
        id: &AgentHostId,
        template_id: &TemplateId,
    ) -> Result<Compatibility>;

    /// Render the host's assigned template, or `None` without one.
    async fn generate_config(&self, id: &AgentHostId) -> Result<Option<GeneratedConfig>>;
}

/// The main control plane service implementation.
pub struct CorePlaneService<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) clients: Arc<dyn AgentClientFactory>,
    pub(crate) contexts: Arc<dyn ContextProvider>,
    pub(crate) locks: InstanceLocks,
    pub(crate) config: ControlConfig,
}

impl<S: Store> CorePlaneService<S> {
    /// Create a new control plane service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        clients: Arc<dyn AgentClientFactory>,
        contexts: Arc<dyn ContextProvider>,
        config: ControlConfig,
    ) -> Self {
        Self {
            store,
            clients,
            contexts,
            locks: InstanceLocks::new(),
            config,
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    fn client_for(&self, host: &AgentHost) -> Result<Arc<dyn AgentClient>> {
        Ok(self.clients.connect(&AgentEndpoint::for_host(host, &self.config))?)
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = std::result::Result<T, RpcError>> + Send,
    ) -> Result<T> {
        let timeout = self.config.rpc_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RpcError::Timeout(timeout).into()),
        }
    }
}

#[async_trait]
impl<S: Store + 'static> CorePlane for CorePlaneService<S> {
    async fn register_agent_host(&self, request: RegisterAgentHostRequest) -> Result<AgentHost> {
        hosts::register_agent_host(self.store.as_ref(), request)
    }

    async fn get_agent_host(&self, id: &AgentHostId) -> Result<AgentHost> {
        hosts::get_agent_host(self.store.as_ref(), id)
    }

    async fn list_agent_hosts(&self) -> Result<Vec<AgentHost>> {
        Ok(self.store.list_agent_hosts()?)
    }

    async fn get_cores(&self, id: &AgentHostId) -> Result<Vec<CoreInfo>> {
        let host = hosts::get_agent_host(self.store.as_ref(), id)?;
        let client = self.client_for(&host)?;
        let cores = self.bounded(client.get_cores()).await.map_err(|e| {
            tracing::warn!(agent_host_id = %id, error = %e, "Failed to list agent cores");
            e
        })?;
        tracing::debug!(agent_host_id = %id, cores = cores.len(), "Listed agent cores");
        Ok(cores)
    }

    async fn get_instances(&self, id: &AgentHostId) -> Result<Vec<AgentCoreInstance>> {
        hosts::get_agent_host(self.store.as_ref(), id)?;
        Ok(self.store.list_instances_by_host(id)?)
    }

    async fn create_instance(&self, request: CreateInstanceRequest) -> Result<AgentCoreInstance> {
        let result = self
            .run_switch(SwitchKind::Create, request.into(), CancellationToken::new())
            .await?;

        if !result.success {
            return Err(ControlError::SwitchFailed {
                switch_log_id: result.switch_log_id,
                message: result.error,
            });
        }
        result.instance.ok_or_else(|| {
            ControlError::Internal(format!(
                "switch {} succeeded without an instance",
                result.switch_log_id
            ))
        })
    }

    async fn delete_instance(&self, id: &AgentHostId, instance_id: &InstanceId) -> Result<()> {
        let host = hosts::get_agent_host(self.store.as_ref(), id)?;
        let not_found = || ControlError::InstanceNotFound {
            agent_host_id: *id,
            instance_id: instance_id.clone(),
        };
        self.store.get_instance(id, instance_id)?.ok_or_else(not_found)?;

        let _guard = self
            .locks
            .try_acquire(*id, [instance_id])
            .map_err(|instance_id| ControlError::SwitchInProgress {
                agent_host_id: *id,
                instance_id,
            })?;

        let client = self.client_for(&host)?;
        self.bounded(client.delete_instance(instance_id)).await?;

        self.store.delete_instance(id, instance_id).map_err(|e| match e {
            StoreError::NotFound => not_found(),
            other => other.into(),
        })?;

        tracing::info!(agent_host_id = %id, instance_id = %instance_id, "Deleted instance");
        Ok(())
    }

    async fn switch_core(&self, request: SwitchCoreRequest) -> Result<SwitchResult> {
        self.switch_core_with_cancel(request, CancellationToken::new())
            .await
    }

    async fn switch_core_with_cancel(
        &self,
        request: SwitchCoreRequest,
        cancel: CancellationToken,
    ) -> Result<SwitchResult> {
        if request.from_instance_id.is_none() {
            return Err(ControlError::Validation(
                "from_instance_id is required; use create_instance for a first instance".to_string(),
            ));
        }
        self.run_switch(SwitchKind::Switch, request, cancel).await
    }

    async fn get_switch_logs(
        &self,
        mut filter: SwitchLogFilter,
    ) -> Result<(Vec<AgentCoreSwitchLog>, usize)> {
        let max = self.config.switch_log_page_limit;
        filter.limit = Some(filter.limit.map_or(max, |limit| limit.min(max)));
        Ok(self.store.list_switch_logs(&filter)?)
    }

    async fn get_switch_log(&self, id: &SwitchLogId) -> Result<AgentCoreSwitchLog> {
        self.store
            .get_switch_log(id)?
            .ok_or(ControlError::SwitchLogNotFound(*id))
    }

    async fn convert_config(&self, source: &str, target: &str, raw: &str) -> Result<Converted> {
        Ok(coreswitch_codec::convert_config(source, target, raw.as_bytes())?)
    }

    async fn create_template(&self, request: CreateTemplateRequest) -> Result<ConfigTemplate> {
        templates::create_template(self.store.as_ref(), request)
    }

    async fn update_template(&self, id: &TemplateId, request: UpdateTemplateRequest) -> Result<ConfigTemplate> {
        templates::update_template(self.store.as_ref(), id, request)
    }

    async fn get_template(&self, id: &TemplateId) -> Result<ConfigTemplate> {
        templates::get_template(self.store.as_ref(), id)
    }

    async fn list_templates(&self) -> Result<Vec<ConfigTemplate>> {
        Ok(self.store.list_templates()?)
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<()> {
        templates::delete_template(self.store.as_ref(), id)
    }

    async fn validate_template(&self, content: &str, engine: CoreEngine) -> Result<ValidationReport> {
        Ok(coreswitch_template::validate_template(content, engine))
    }

    async fn preview_template(&self, content: &str, engine: CoreEngine) -> Result<String> {
        Ok(coreswitch_template::preview_render(content, engine)?)
    }

    async fn assign_template(&self, id: &AgentHostId, template_id: Option<TemplateId>) -> Result<Compatibility> {
        templates::assign_template(self.store.as_ref(), id, template_id)
    }

    async fn check_template_compatibility(
        &self,
        id: &AgentHostId,
        template_id: &TemplateId,
    ) -> Result<Compatibility> {
        templates::check_template_compatibility(self.store.as_ref(), id, template_id)
    }

    async fn generate_config(&self, id: &AgentHostId) -> Result<Option<GeneratedConfig>> {
        templates::generate_config(self.store.as_ref(), self.contexts.as_ref(), id)
    }
}
