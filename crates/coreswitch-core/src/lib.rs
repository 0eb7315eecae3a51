//! Core types and utilities for coreswitch.
//!
//! This crate provides the foundational types used throughout the coreswitch
//! configuration pipeline:
//!
//! - **Identifiers**: Strongly-typed IDs for agent hosts, templates, switch
//!   logs and core instances, plus the config content hash
//! - **Engines**: The closed set of proxy core engines (`xray`, `sing-box`)
//! - **Capabilities**: What an agent's engine build supports, self-reported or
//!   derived from its version
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use coreswitch_core::{AgentCapabilities, CoreEngine, InstanceId};
//!
//! let engine: CoreEngine = "singbox".parse().unwrap();
//! let agent = AgentCapabilities::new(engine, "1.8.0");
//! assert!(agent.supports_capability("reality"));
//! assert!(agent.supports_version("1.7"));
//!
//! let instance = InstanceId::new("node-1").unwrap();
//! assert_eq!(instance.as_str(), "node-1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod capability;
pub mod engine;
pub mod error;
pub mod ids;

pub use capability::{
    caps, derive_capabilities, parse_version, AgentCapabilities, Capability, Compatibility,
    VersionError, VersionSupport,
};
pub use engine::{CoreEngine, UnknownEngine};
pub use error::{CoreError, Result};
pub use ids::{AgentHostId, ConfigHash, IdError, InstanceId, SwitchLogId, TemplateId};
