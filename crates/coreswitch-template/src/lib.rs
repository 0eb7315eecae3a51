//! Configuration templates for coreswitch.
//!
//! Turns admin-authored template text plus a structured context into the
//! raw configuration an agent runs, degrading features the agent cannot
//! support on the way.
//!
//! # Architecture
//!
//! ```text
//!   ConfigContext ──► filter_context ──► to_render_value ──► Template::render ──► validate_final_config
//!   (canonical)       (per agent)        (native inbounds)   (text)               (last gate)
//! ```
//!
//! Authoring-time checks ([`validate_template`], [`preview_render`]) use a
//! fixed sample context and never see live agent or user data.
//!
//! # Example
//!
//! ```
//! use coreswitch_core::CoreEngine;
//! use coreswitch_template::{preview_render, validate_template};
//!
//! let template = r#"{"inbounds": {{inbounds}}, "outbounds": {{outbounds}}}"#;
//! assert!(validate_template(template, CoreEngine::SingBox).valid);
//! assert!(preview_render(template, CoreEngine::SingBox).unwrap().contains("vless-reality"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod engine;
pub mod error;
pub mod filter;
pub mod sample;
pub mod validator;

pub use context::{AgentInfo, ConfigContext, RenderContext, ServerInfo};
pub use engine::{render, Template};
pub use error::{Result, TemplateError};
pub use filter::{filter_context, filter_inbound};
pub use sample::{preview_render, sample_context};
pub use validator::{validate_final_config, validate_template, FinalConfigReport, ValidationReport};
