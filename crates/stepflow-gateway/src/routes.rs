use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, info};

use stepflow_core::config::ExecutionMode;
use stepflow_core::error::StepflowError;
use stepflow_core::types::{GraphId, RunId};
use stepflow_engine::{GraphDefinition, GraphPayload, RunOptions};

use crate::connection;
use crate::protocol::{ApiError, RunQuery, RunRequest, RunResponse};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bind": state.config.bind,
        "tools": state.engine.tools().list(),
    }))
}

// POST /graph/create (full or compact definition)
pub async fn create_graph(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<serde_json::Value> {
    let payload: GraphPayload = serde_json::from_value(body)
        .map_err(|e| StepflowError::Structural(format!("unrecognized graph definition: {e}")))?;
    let graph_id = state.engine.create_graph(GraphDefinition::from(payload))?;
    Ok(Json(serde_json::json!({ "graph_id": graph_id })))
}

// POST /graph/create_sample
pub async fn create_sample(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let graph_id = state.engine.create_sample_graph()?;
    Ok(Json(serde_json::json!({ "graph_id": graph_id })))
}

// GET /api/graphs
pub async fn list_graphs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "graphs": state.engine.list_graphs() }))
}

// GET /api/runs
pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "runs": state.engine.list_runs() }))
}

// POST /graph/run?sync=true
pub async fn run_graph(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunQuery>,
    Json(body): Json<RunRequest>,
) -> ApiResult<RunResponse> {
    let options = RunOptions {
        max_visits_per_node: body.max_visits_per_node,
        mode: query.sync.map(|sync| {
            if sync {
                ExecutionMode::Sync
            } else {
                ExecutionMode::Background
            }
        }),
        dead_end: body.dead_end,
        fallback: None,
    };
    let run_id = state
        .engine
        .start_run(&body.graph_id, body.initial_state, options)
        .await?;
    info!(run_id = %run_id, graph_id = %body.graph_id, "Run requested");
    Ok(Json(state.engine.get_run_state(&run_id)?.into()))
}

// GET /graph/state/{run_id}
pub async fn run_state(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<RunResponse> {
    let snap = state.engine.get_run_state(&RunId::from_string(&run_id))?;
    Ok(Json(snap.into()))
}

// GET /api/graphs/{graph_id}
pub async fn graph_definition(
    State(state): State<Arc<AppState>>,
    Path(graph_id): Path<String>,
) -> ApiResult<GraphDefinition> {
    let graph = state.engine.graph(&GraphId::from_string(&graph_id))?;
    Ok(Json(graph.definition().clone()))
}

// GET /ws/run/{run_id}
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, RunId::from_string(&run_id)))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>, run_id: RunId) {
    info!(run_id = %run_id, "Run log subscriber connected");
    connection::stream_run_log(socket, &state.engine, &run_id).await;
    debug!(run_id = %run_id, "Run log subscriber disconnected");
}
