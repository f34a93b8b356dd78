use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use stepflow_core::config::GatewayConfig;
use stepflow_engine::Engine;

use crate::routes;
use crate::state::AppState;

/// HTTP + WebSocket gateway built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: Arc<Engine>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: Arc<Engine>) -> Self {
        Self { config, engine }
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            engine: self.engine.clone(),
        });

        Router::new()
            // Graphs and runs
            .route("/graph/create", post(routes::create_graph))
            .route("/graph/create_sample", post(routes::create_sample))
            .route("/graph/run", post(routes::run_graph))
            .route("/graph/state/{run_id}", get(routes::run_state))
            // Live run log
            .route("/ws/run/{run_id}", get(routes::ws_handler))
            // REST API
            .route("/api/health", get(routes::health))
            .route("/api/graphs", get(routes::list_graphs))
            .route("/api/graphs/{graph_id}", get(routes::graph_definition))
            .route("/api/runs", get(routes::list_runs))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve on an already bound listener until the token is cancelled.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = self.router();
        info!(bind = %listener.local_addr()?, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }

    /// Bind the configured address and serve until the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.bind).await?;
        self.serve(listener, shutdown).await
    }
}
