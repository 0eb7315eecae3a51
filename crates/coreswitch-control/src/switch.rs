//! Switch orchestration.
//!
//! A switch runs in two phases. The preparation phase validates the request,
//! takes the instance locks, resolves the configuration and durably writes
//! the `pending` audit row; any failure here is returned to the caller and no
//! agent is contacted. The job phase runs in a spawned task that owns the
//! locks: it calls the agent, records the terminal status and reconciles
//! instance rows. Because the job is spawned, a caller that goes away still
//! leaves a terminal audit row behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coreswitch_core::{ConfigHash, CoreEngine, SwitchLogId, TemplateId};
use coreswitch_store::{
    AgentCoreInstance, AgentCoreSwitchLog, AgentHost, InstanceStatus, Store, SwitchStatus,
};
use tokio_util::sync::CancellationToken;

use crate::agent_client::{AgentClientFactory, AgentEndpoint, RpcError, RpcSwitchRequest, RpcSwitchResponse};
use crate::error::{ControlError, Result};
use crate::hosts;
use crate::locks::InstanceGuard;
use crate::service::CorePlaneService;
use crate::switch_state::transition;
use crate::templates;
use crate::types::{SwitchCoreRequest, SwitchResult};

/// Message recorded when the caller cancels a switch.
pub const CANCELLED_MESSAGE: &str = "switch cancelled by caller";

/// Whether a job bootstraps a new instance or replaces a running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchKind {
    Create,
    Switch,
}

/// A configuration ready to send.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub raw: String,
    pub hash: ConfigHash,
    pub template_id: Option<TemplateId>,
    pub warnings: Vec<String>,
}

/// Everything the job phase needs, owned.
struct SwitchJob<S> {
    kind: SwitchKind,
    store: Arc<S>,
    clients: Arc<dyn AgentClientFactory>,
    endpoint: AgentEndpoint,
    timeout: Duration,
    log: AgentCoreSwitchLog,
    rpc: RpcSwitchRequest,
    template_id: Option<TemplateId>,
    warnings: Vec<String>,
    cancel: CancellationToken,
    _guard: InstanceGuard,
}

impl<S: Store + 'static> CorePlaneService<S> {
    /// Resolve the configuration for a switch.
    ///
    /// A non-empty explicit payload wins over a template reference and is
    /// sent verbatim; it only has to be valid JSON.
    pub(crate) fn resolve_config(
        &self,
        host: &AgentHost,
        engine: CoreEngine,
        config: Option<&str>,
        template_id: Option<TemplateId>,
    ) -> Result<ResolvedConfig> {
        if let Some(raw) = config.filter(|raw| !raw.trim().is_empty()) {
            serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|e| ControlError::Validation(format!("config is not valid JSON: {e}")))?;
            return Ok(ResolvedConfig {
                raw: raw.to_string(),
                hash: ConfigHash::of(raw.as_bytes()),
                template_id: None,
                warnings: Vec::new(),
            });
        }

        let Some(template_id) = template_id else {
            return Err(ControlError::Validation(
                "either config or config_template_id is required".to_string(),
            ));
        };
        let template = templates::get_template(self.store.as_ref(), &template_id)?;
        let agent = templates::capabilities_for(host, engine);
        let generated = templates::render_for_agent(self.contexts.as_ref(), host, &agent, &template)?;

        Ok(ResolvedConfig {
            hash: generated.config_hash,
            raw: generated.raw,
            template_id: Some(template_id),
            warnings: generated.warnings,
        })
    }

    /// Prepare and run a switch to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected before the audit row is
    /// written. Remote failures are reported in the returned result.
    pub(crate) async fn run_switch(
        &self,
        kind: SwitchKind,
        request: SwitchCoreRequest,
        cancel: CancellationToken,
    ) -> Result<SwitchResult> {
        let job = self.prepare(kind, request, cancel)?;
        let switch_log_id = job.log.id;

        tokio::spawn(job.run()).await.map_err(|e| {
            tracing::error!(switch_log_id = %switch_log_id, error = %e, "Switch job aborted");
            ControlError::Internal(format!("switch job {switch_log_id} aborted: {e}"))
        })
    }

    fn prepare(
        &self,
        kind: SwitchKind,
        request: SwitchCoreRequest,
        cancel: CancellationToken,
    ) -> Result<SwitchJob<S>> {
        let store = self.store.as_ref();
        let host = hosts::get_agent_host(store, &request.agent_host_id)?;
        let to = request.to_instance_id.clone();
        let from = match kind {
            SwitchKind::Create => None,
            SwitchKind::Switch => request.from_instance_id.clone(),
        };

        let guard = self
            .locks
            .try_acquire(host.id, from.iter().chain(std::iter::once(&to)))
            .map_err(|instance_id| ControlError::SwitchInProgress {
                agent_host_id: host.id,
                instance_id,
            })?;

        let from_instance = match &from {
            Some(id) => Some(store.get_instance(&host.id, id)?.ok_or_else(|| {
                ControlError::InstanceNotFound {
                    agent_host_id: host.id,
                    instance_id: id.clone(),
                }
            })?),
            None => None,
        };
        let occupied = match (kind, store.get_instance(&host.id, &to)?) {
            (SwitchKind::Create, Some(_)) => true,
            (SwitchKind::Switch, Some(existing)) => {
                existing.status == InstanceStatus::Running && from.as_ref() != Some(&to)
            }
            (_, None) => false,
        };
        if occupied {
            return Err(ControlError::InstanceExists {
                agent_host_id: host.id,
                instance_id: to,
            });
        }

        let resolved = self.resolve_config(
            &host,
            request.to_core_type,
            request.config.as_deref(),
            request.config_template_id,
        )?;

        let log = AgentCoreSwitchLog {
            id: SwitchLogId::generate(),
            agent_host_id: host.id,
            from_instance_id: from.clone(),
            to_instance_id: Some(to.clone()),
            from_core_type: from_instance.as_ref().map(|i| i.core_type),
            to_core_type: request.to_core_type,
            status: SwitchStatus::Pending,
            message: String::new(),
            operator_id: request.operator_id,
            created_at: Utc::now(),
            completed_at: None,
        };
        store.insert_switch_log(&log)?;

        tracing::info!(
            switch_log_id = %log.id,
            agent_host_id = %host.id,
            from_instance_id = ?from,
            to_instance_id = %to,
            to_core_type = %request.to_core_type,
            "Switch pending"
        );

        Ok(SwitchJob {
            kind,
            store: Arc::clone(&self.store),
            clients: Arc::clone(&self.clients),
            endpoint: AgentEndpoint::for_host(&host, &self.config),
            timeout: self.config.rpc_timeout(),
            rpc: RpcSwitchRequest {
                switch_id: log.id,
                from_instance_id: from,
                to_instance_id: to,
                core_type: request.to_core_type,
                config: resolved.raw,
                config_hash: resolved.hash,
            },
            log,
            template_id: resolved.template_id,
            warnings: resolved.warnings,
            cancel,
            _guard: guard,
        })
    }
}

impl<S: Store + 'static> SwitchJob<S> {
    async fn run(mut self) -> SwitchResult {
        let mut reconciliation = Vec::new();

        let outcome = match self.clients.connect(&self.endpoint) {
            Ok(client) => {
                self.record(SwitchStatus::InProgress, "calling agent", &mut reconciliation);
                tracing::debug!(
                    switch_log_id = %self.log.id,
                    address = %self.endpoint.address,
                    "Calling agent"
                );
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(CANCELLED_MESSAGE.to_string()),
                    result = tokio::time::timeout(self.timeout, client.switch_core(&self.rpc)) => {
                        match result {
                            Err(_) => Err(RpcError::Timeout(self.timeout).to_string()),
                            Ok(Err(e)) => Err(e.to_string()),
                            Ok(Ok(response)) if response.success => Ok(response),
                            Ok(Ok(response)) => Err(rejection_message(&response)),
                        }
                    }
                }
            }
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(response) => self.succeed(response, reconciliation),
            Err(error) => self.fail(error, reconciliation),
        }
    }

    /// Best-effort status write; the in-memory row always advances.
    fn record(&mut self, status: SwitchStatus, message: &str, reconciliation: &mut Vec<String>) {
        if let Err(e) = transition(&mut self.log, status, message) {
            tracing::error!(switch_log_id = %self.log.id, error = %e, "Rejected switch status change");
            reconciliation.push(e.to_string());
            return;
        }
        if let Err(e) = self.store.update_switch_log(&self.log) {
            tracing::warn!(
                switch_log_id = %self.log.id,
                agent_host_id = %self.log.agent_host_id,
                status = %status,
                error = %e,
                "Failed to persist switch status"
            );
            reconciliation.push(format!("switch log {} not marked {status}: {e}", self.log.id));
        }
    }

    /// Point the host record at the engine that is now running.
    ///
    /// Self-reported capabilities and build tags describe the previous
    /// engine, so an engine change clears them until the agent re-registers.
    fn refresh_host(&self, reported_version: Option<String>, reconciliation: &mut Vec<String>) {
        let host_id = self.log.agent_host_id;
        let engine = self.rpc.core_type;
        let mut host = match self.store.get_agent_host(&host_id) {
            Ok(Some(host)) => host,
            Ok(None) => {
                reconciliation.push(format!("agent host {host_id} vanished before refresh"));
                return;
            }
            Err(e) => {
                tracing::warn!(agent_host_id = %host_id, error = %e, "Failed to load agent host");
                reconciliation.push(format!("agent host {host_id} not refreshed: {e}"));
                return;
            }
        };

        let engine_changed = host.core_type != engine;
        let version_changed = reported_version.is_some() && reported_version != host.core_version;
        if !engine_changed && !version_changed {
            return;
        }

        if engine_changed {
            host.capabilities.clear();
            host.build_tags.clear();
            host.core_version = None;
        }
        host.core_type = engine;
        if reported_version.is_some() {
            host.core_version = reported_version;
        }
        host.updated_at = Utc::now();

        match self.store.put_agent_host(&host) {
            Ok(()) => tracing::info!(
                agent_host_id = %host_id,
                core_type = %engine,
                core_version = ?host.core_version,
                "Agent host engine updated"
            ),
            Err(e) => {
                tracing::warn!(agent_host_id = %host_id, error = %e, "Failed to update agent host engine");
                reconciliation.push(format!("agent host {host_id} not refreshed: {e}"));
            }
        }
    }

    fn fail(mut self, error: String, mut reconciliation: Vec<String>) -> SwitchResult {
        self.record(SwitchStatus::Failed, &error, &mut reconciliation);
        tracing::warn!(
            switch_log_id = %self.log.id,
            agent_host_id = %self.log.agent_host_id,
            error = %error,
            "Switch failed"
        );

        SwitchResult {
            success: false,
            switch_log_id: self.log.id,
            new_instance_id: None,
            message: String::new(),
            error,
            completed_at: self.log.completed_at,
            warnings: self.warnings,
            reconciliation_warnings: reconciliation,
            instance: None,
        }
    }

    fn succeed(mut self, response: RpcSwitchResponse, mut reconciliation: Vec<String>) -> SwitchResult {
        let message = if response.message.is_empty() {
            "switched".to_string()
        } else {
            response.message.clone()
        };
        self.record(SwitchStatus::Completed, &message, &mut reconciliation);
        self.refresh_host(response.core_version.clone(), &mut reconciliation);

        let host_id = self.log.agent_host_id;
        let to = self.rpc.to_instance_id.clone();

        if let Some(from) = self.rpc.from_instance_id.as_ref().filter(|from| **from != to) {
            if let Err(e) = self
                .store
                .update_instance_status(&host_id, from, InstanceStatus::Stopped)
            {
                tracing::warn!(
                    switch_log_id = %self.log.id,
                    agent_host_id = %host_id,
                    instance_id = %from,
                    error = %e,
                    "Failed to stop previous instance"
                );
                reconciliation.push(format!("instance {from} not marked stopped: {e}"));
            }
        }

        let now = Utc::now();
        let instance = AgentCoreInstance {
            agent_host_id: host_id,
            instance_id: to.clone(),
            core_type: self.rpc.core_type,
            status: InstanceStatus::Running,
            config_template_id: self.template_id,
            config_hash: self.rpc.config_hash.clone(),
            listen_ports: response.listen_ports,
            last_heartbeat_at: None,
            error_message: String::new(),
            created_at: now,
            updated_at: now,
        };
        let written = match self.kind {
            SwitchKind::Create => self.store.insert_instance(&instance),
            SwitchKind::Switch => self.store.put_instance(&instance),
        };
        if let Err(e) = written {
            tracing::warn!(
                switch_log_id = %self.log.id,
                agent_host_id = %host_id,
                instance_id = %to,
                error = %e,
                "Failed to record new instance"
            );
            reconciliation.push(format!("instance {to} not recorded: {e}"));
        }

        tracing::info!(
            switch_log_id = %self.log.id,
            agent_host_id = %host_id,
            instance_id = %to,
            reconciliation_warnings = reconciliation.len(),
            "Switch completed"
        );

        SwitchResult {
            success: true,
            switch_log_id: self.log.id,
            new_instance_id: Some(to),
            message,
            error: String::new(),
            completed_at: self.log.completed_at,
            warnings: self.warnings,
            reconciliation_warnings: reconciliation,
            instance: Some(instance),
        }
    }
}

fn rejection_message(response: &RpcSwitchResponse) -> String {
    if !response.error.is_empty() {
        response.error.clone()
    } else if !response.message.is_empty() {
        response.message.clone()
    } else {
        "agent rejected the switch".to_string()
    }
}

