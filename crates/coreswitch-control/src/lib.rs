//! Control plane for coreswitch agent hosts.
//!
//! This crate provides the business logic for managing agent hosts, their
//! configuration templates and live core switches. It coordinates between
//! the storage layer, the template pipeline and the remote agents.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Gateway (HTTP)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CorePlaneService                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Hosts     │ │  Templates  │ │  Switch Orchestrator│    │
//! │  │             │ │  + Compat   │ │  + Audit State      │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │ Template │   │  Agent   │
//!        │ (RocksDB)│   │ + Codec  │   │  (RPC)   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use coreswitch_control::{
//!     ControlConfig, CorePlane, CorePlaneService, CreateInstanceRequest, HttpAgentClientFactory,
//!     NodeProfile, RegisterAgentHostRequest,
//! };
//! use coreswitch_core::{CoreEngine, InstanceId};
//! use coreswitch_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/coreswitch")?);
//! let control = CorePlaneService::new(
//!     store,
//!     Arc::new(HttpAgentClientFactory),
//!     Arc::new(NodeProfile::default()),
//!     ControlConfig::default(),
//! );
//!
//! let host = control
//!     .register_agent_host(
//!         RegisterAgentHostRequest::new("edge-1", "https://edge-1:7443", CoreEngine::SingBox)
//!             .with_version("1.8.0"),
//!     )
//!     .await?;
//!
//! let instance = control
//!     .create_instance(CreateInstanceRequest {
//!         agent_host_id: host.id,
//!         instance_id: InstanceId::new("node-1")?,
//!         core_type: CoreEngine::SingBox,
//!         config: Some(r#"{"inbounds": []}"#.to_string()),
//!         config_template_id: None,
//!         operator_id: None,
//!     })
//!     .await?;
//! println!("Started {}", instance.instance_id);
//! # Ok(())
//! # }
//! ```
//!
//! # Switch audit
//!
//! Every create or switch writes a `pending` audit row before the agent is
//! called, then moves it to `in_progress` and finally to `completed` or
//! `failed`. See the [`switch_state`] module for transition validation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent_client;
pub mod context;
pub mod error;
pub mod hosts;
pub mod locks;
pub mod service;
pub mod switch;
pub mod switch_state;
pub mod templates;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod types;

pub use agent_client::{
    AgentClient, AgentClientFactory, AgentEndpoint, CoreInfo, HttpAgentClient,
    HttpAgentClientFactory, RpcError, RpcSwitchRequest, RpcSwitchResponse,
};
pub use context::{ContextProvider, NodeProfile};
pub use error::{ControlError, Result};
pub use locks::InstanceLocks;
pub use service::{CorePlane, CorePlaneService};
pub use switch::CANCELLED_MESSAGE;
pub use types::{
    ControlConfig, CreateInstanceRequest, CreateTemplateRequest, GeneratedConfig,
    RegisterAgentHostRequest, SwitchCoreRequest, SwitchResult, UpdateTemplateRequest,
};

// Re-export commonly used types from dependencies for convenience
pub use coreswitch_core::{AgentHostId, Compatibility, CoreEngine, InstanceId, SwitchLogId, TemplateId};
pub use coreswitch_store::{
    AgentCoreInstance, AgentCoreSwitchLog, AgentHost, ConfigTemplate, InstanceStatus,
    SwitchLogFilter, SwitchStatus,
};
pub use tokio_util::sync::CancellationToken;
