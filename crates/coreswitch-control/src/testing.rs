//! In-memory doubles for exercising the control plane without agents.
//!
//! Available in tests and behind the `test-utils` feature.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use coreswitch_core::{AgentHostId, CoreEngine, InstanceId, SwitchLogId, TemplateId};
use coreswitch_store::{
    AgentCoreInstance, AgentCoreSwitchLog, AgentHost, ConfigTemplate, InstanceStatus, Result,
    Store, StoreError, SwitchLogFilter,
};
use parking_lot::Mutex;

use crate::agent_client::{
    AgentClient, AgentClientFactory, AgentEndpoint, CoreInfo, RpcError, RpcSwitchRequest,
    RpcSwitchResponse,
};

/// How the fake agent answers a switch call.
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Apply the configuration and report the given ports.
    Succeed(Vec<u16>),
    /// Answer with `success == false` and the given error.
    Reject(String),
    /// Fail at the transport level.
    Fail(RpcError),
    /// Never answer.
    Hang,
}

/// A call the fake agent received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    /// `get_cores`.
    GetCores,
    /// `switch_core` for a switch ID.
    Switch(SwitchLogId),
    /// `delete_instance`.
    Delete(InstanceId),
}

type Probe = Arc<dyn Fn(&RpcSwitchRequest) + Send + Sync>;

#[derive(Default)]
struct FakeState {
    calls: Vec<FakeCall>,
    switches: Vec<RpcSwitchRequest>,
    endpoints: Vec<AgentEndpoint>,
}

/// A factory whose clients all share one scripted fake agent.
#[derive(Clone)]
pub struct FakeAgentFactory {
    behavior: Arc<Mutex<FakeBehavior>>,
    connect_error: Arc<Mutex<Option<RpcError>>>,
    cores: Arc<Mutex<Vec<CoreInfo>>>,
    state: Arc<Mutex<FakeState>>,
    probe: Arc<Mutex<Option<Probe>>>,
}

impl FakeAgentFactory {
    /// Create a fake agent with the given switch behavior.
    #[must_use]
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            connect_error: Arc::new(Mutex::new(None)),
            cores: Arc::new(Mutex::new(vec![CoreInfo {
                core_type: CoreEngine::SingBox,
                version: Some("1.8.0".to_string()),
                capabilities: Vec::new(),
                build_tags: Vec::new(),
                running: true,
            }])),
            state: Arc::new(Mutex::new(FakeState::default())),
            probe: Arc::new(Mutex::new(None)),
        }
    }

    /// A fake agent that applies every switch.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::new(FakeBehavior::Succeed(vec![443]))
    }

    /// Change the switch behavior.
    pub fn set_behavior(&self, behavior: FakeBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Make `connect` fail with the given error.
    pub fn fail_connect(&self, error: RpcError) {
        *self.connect_error.lock() = Some(error);
    }

    /// Run a closure on every switch request before answering it.
    ///
    /// Tests use this to observe the store at call time.
    pub fn set_probe(&self, probe: impl Fn(&RpcSwitchRequest) + Send + Sync + 'static) {
        *self.probe.lock() = Some(Arc::new(probe));
    }

    /// Replace the engines the agent reports.
    pub fn set_cores(&self, cores: Vec<CoreInfo>) {
        *self.cores.lock() = cores;
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    /// Switch requests received so far, in order.
    #[must_use]
    pub fn switches(&self) -> Vec<RpcSwitchRequest> {
        self.state.lock().switches.clone()
    }

    /// Endpoints clients were built for.
    #[must_use]
    pub fn endpoints(&self) -> Vec<AgentEndpoint> {
        self.state.lock().endpoints.clone()
    }
}

impl AgentClientFactory for FakeAgentFactory {
    fn connect(&self, endpoint: &AgentEndpoint) -> std::result::Result<Arc<dyn AgentClient>, RpcError> {
        if let Some(error) = self.connect_error.lock().clone() {
            return Err(error);
        }
        self.state.lock().endpoints.push(endpoint.clone());
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl AgentClient for FakeAgentFactory {
    async fn get_cores(&self) -> std::result::Result<Vec<CoreInfo>, RpcError> {
        self.state.lock().calls.push(FakeCall::GetCores);
        Ok(self.cores.lock().clone())
    }

    async fn switch_core(
        &self,
        request: &RpcSwitchRequest,
    ) -> std::result::Result<RpcSwitchResponse, RpcError> {
        {
            let mut state = self.state.lock();
            state.calls.push(FakeCall::Switch(request.switch_id));
            state.switches.push(request.clone());
        }
        let probe = self.probe.lock().clone();
        if let Some(probe) = probe {
            probe(request);
        }

        let behavior = self.behavior.lock().clone();
        match behavior {
            FakeBehavior::Succeed(listen_ports) => Ok(RpcSwitchResponse {
                success: true,
                message: "applied".to_string(),
                error: String::new(),
                listen_ports,
                core_version: self
                    .cores
                    .lock()
                    .iter()
                    .find(|core| core.core_type == request.core_type)
                    .and_then(|core| core.version.clone()),
            }),
            FakeBehavior::Reject(error) => Ok(RpcSwitchResponse {
                success: false,
                error,
                ..RpcSwitchResponse::default()
            }),
            FakeBehavior::Fail(error) => Err(error),
            FakeBehavior::Hang => std::future::pending().await,
        }
    }

    async fn delete_instance(&self, instance_id: &InstanceId) -> std::result::Result<(), RpcError> {
        self.state.lock().calls.push(FakeCall::Delete(instance_id.clone()));
        match self.behavior.lock().clone() {
            FakeBehavior::Fail(error) => Err(error),
            _ => Ok(()),
        }
    }
}

/// Store operations [`FlakyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlakyOp {
    /// `list_agent_hosts`.
    ListAgentHosts,
    /// `insert_switch_log`.
    InsertSwitchLog,
    /// `update_switch_log`.
    UpdateSwitchLog,
    /// `insert_instance` and `put_instance`.
    WriteInstance,
    /// `update_instance_status`.
    UpdateInstanceStatus,
}

/// A store wrapper that fails selected writes.
pub struct FlakyStore<S> {
    inner: S,
    failing: Mutex<HashSet<FlakyOp>>,
}

impl<S: Store> FlakyStore<S> {
    /// Wrap a store; nothing fails until [`FlakyStore::fail`] is called.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make an operation fail from now on.
    pub fn fail(&self, op: FlakyOp) {
        self.failing.lock().insert(op);
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: FlakyOp) -> Result<()> {
        if self.failing.lock().contains(&op) {
            Err(StoreError::Database(format!("injected failure: {op:?}")))
        } else {
            Ok(())
        }
    }
}

impl<S: Store> Store for FlakyStore<S> {
    fn put_agent_host(&self, host: &AgentHost) -> Result<()> {
        self.inner.put_agent_host(host)
    }

    fn get_agent_host(&self, id: &AgentHostId) -> Result<Option<AgentHost>> {
        self.inner.get_agent_host(id)
    }

    fn list_agent_hosts(&self) -> Result<Vec<AgentHost>> {
        self.check(FlakyOp::ListAgentHosts)?;
        self.inner.list_agent_hosts()
    }

    fn set_agent_host_template(&self, id: &AgentHostId, template_id: Option<TemplateId>) -> Result<()> {
        self.inner.set_agent_host_template(id, template_id)
    }

    fn put_template(&self, template: &ConfigTemplate) -> Result<()> {
        self.inner.put_template(template)
    }

    fn get_template(&self, id: &TemplateId) -> Result<Option<ConfigTemplate>> {
        self.inner.get_template(id)
    }

    fn list_templates(&self) -> Result<Vec<ConfigTemplate>> {
        self.inner.list_templates()
    }

    fn delete_template(&self, id: &TemplateId) -> Result<()> {
        self.inner.delete_template(id)
    }

    fn insert_instance(&self, instance: &AgentCoreInstance) -> Result<()> {
        self.check(FlakyOp::WriteInstance)?;
        self.inner.insert_instance(instance)
    }

    fn put_instance(&self, instance: &AgentCoreInstance) -> Result<()> {
        self.check(FlakyOp::WriteInstance)?;
        self.inner.put_instance(instance)
    }

    fn get_instance(&self, host: &AgentHostId, instance_id: &InstanceId) -> Result<Option<AgentCoreInstance>> {
        self.inner.get_instance(host, instance_id)
    }

    fn list_instances_by_host(&self, host: &AgentHostId) -> Result<Vec<AgentCoreInstance>> {
        self.inner.list_instances_by_host(host)
    }

    fn update_instance_status(
        &self,
        host: &AgentHostId,
        instance_id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<()> {
        self.check(FlakyOp::UpdateInstanceStatus)?;
        self.inner.update_instance_status(host, instance_id, status)
    }

    fn delete_instance(&self, host: &AgentHostId, instance_id: &InstanceId) -> Result<()> {
        self.inner.delete_instance(host, instance_id)
    }

    fn insert_switch_log(&self, log: &AgentCoreSwitchLog) -> Result<()> {
        self.check(FlakyOp::InsertSwitchLog)?;
        self.inner.insert_switch_log(log)
    }

    fn get_switch_log(&self, id: &SwitchLogId) -> Result<Option<AgentCoreSwitchLog>> {
        self.inner.get_switch_log(id)
    }

    fn update_switch_log(&self, log: &AgentCoreSwitchLog) -> Result<()> {
        self.check(FlakyOp::UpdateSwitchLog)?;
        self.inner.update_switch_log(log)
    }

    fn list_switch_logs(&self, filter: &SwitchLogFilter) -> Result<(Vec<AgentCoreSwitchLog>, usize)> {
        self.inner.list_switch_logs(filter)
    }
}
