use std::sync::Arc;

use stepflow_core::config::GatewayConfig;
use stepflow_engine::Engine;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: Arc<Engine>,
}
