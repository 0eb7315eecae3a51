//! Gateway application state.

use std::sync::Arc;

use coreswitch_control::CorePlane;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<C>
where
    C: CorePlane,
{
    /// The control plane.
    pub control: Arc<C>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<C> GatewayState<C>
where
    C: CorePlane,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(control: Arc<C>, config: GatewayConfig) -> Self {
        Self { control, config }
    }
}

impl<C> Clone for GatewayState<C>
where
    C: CorePlane,
{
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            config: self.config.clone(),
        }
    }
}
