//! HTTP gateway for the coreswitch control plane.
//!
//! This crate exposes the control plane over a JSON API:
//!
//! - Agent host registration and core discovery
//! - Instance creation, deletion and core switching
//! - The switch audit trail
//! - Configuration templates, compatibility checks and config generation
//! - Configuration conversion between engines
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Operators / Panels                        │
//! │                         (HTTP)                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   coreswitch-gateway                         │
//! │        ┌─────────────┐        ┌─────────────────┐           │
//! │        │   Router    │        │   ApiError      │           │
//! │        │ + Handlers  │        │   envelope      │           │
//! │        └─────────────┘        └─────────────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                     ┌─────────────────┐         ┌──────────┐
//!                     │  CorePlane      │ ──RPC──▶│  Agents  │
//!                     │  (control)      │         └──────────┘
//!                     └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use coreswitch_gateway::{GatewayConfig, GatewayState, create_router};
//! use coreswitch_control::{
//!     ControlConfig, CorePlaneService, HttpAgentClientFactory, NodeProfile,
//! };
//! use coreswitch_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/coreswitch")?);
//! let control = Arc::new(CorePlaneService::new(
//!     store,
//!     Arc::new(HttpAgentClientFactory),
//!     Arc::new(NodeProfile::default()),
//!     ControlConfig::default(),
//! ));
//!
//! let state = GatewayState::new(control, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::{ApiError, ApiJson};
pub use routes::create_router;
pub use state::GatewayState;
