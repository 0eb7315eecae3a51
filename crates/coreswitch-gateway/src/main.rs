//! Coreswitch Gateway - HTTP API for the control plane
//!
//! # Environment
//!
//! - `LISTEN_ADDR` - bind address (default `0.0.0.0:8080`)
//! - `DATA_DIR` - `RocksDB` directory (default `/data/coreswitch`)
//! - `AGENT_RPC_TIMEOUT_SECONDS` - upper bound of one agent call
//! - `NODE_PROFILE` - JSON file with the listeners and users templates render
//! - `RUST_LOG` - tracing filter

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coreswitch_control::{ControlConfig, CorePlaneService, HttpAgentClientFactory, NodeProfile};
use coreswitch_gateway::{create_router, GatewayConfig, GatewayState};
use coreswitch_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coreswitch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Coreswitch Gateway");

    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/coreswitch".into());
    let profile_path = std::env::var("NODE_PROFILE").ok();

    let mut control_config = ControlConfig::default();
    if let Ok(raw) = std::env::var("AGENT_RPC_TIMEOUT_SECONDS") {
        control_config.rpc_timeout_seconds = raw.parse()?;
    }

    tracing::info!(
        listen_addr = %listen_addr,
        data_dir = %data_dir,
        node_profile = ?profile_path,
        rpc_timeout_seconds = control_config.rpc_timeout_seconds,
        "Gateway configuration loaded"
    );

    let profile = match profile_path {
        Some(path) => NodeProfile::from_json(&std::fs::read_to_string(&path)?)?,
        None => {
            tracing::warn!("No NODE_PROFILE set - templates render without listeners");
            NodeProfile::default()
        }
    };

    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);

    let control = Arc::new(CorePlaneService::new(
        store,
        Arc::new(HttpAgentClientFactory),
        Arc::new(profile),
        control_config,
    ));
    tracing::info!("Control plane initialized");

    let mut gateway_config = GatewayConfig::default();
    gateway_config.listen_addr.clone_from(&listen_addr);
    let state = GatewayState::new(control, gateway_config);
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
