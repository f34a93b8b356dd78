use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{error, info, warn};

use stepflow_core::config::{EngineConfig, ExecutionMode};
use stepflow_core::error::{Result, StepflowError};
use stepflow_core::types::{GraphId, RunEvent, RunId, RunStatus, StateMap};
use stepflow_tools::ToolRegistry;

use crate::graph::{Graph, GraphDefinition};
use crate::interpreter::Interpreter;
use crate::registry::RunRegistry;
use crate::run::{ResolvedOptions, RunHandle, RunOptions, RunSnapshot};
use crate::sample;

/// Summary of a stored graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphInfo {
    pub graph_id: GraphId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub entry: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: RunId,
    pub graph_id: GraphId,
    pub status: RunStatus,
    pub events: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct StoredGraph {
    graph: Arc<Graph>,
    created_at: DateTime<Utc>,
}

/// Entry point for creating graphs and running them.
///
/// Owns the graph store, the tool registry and the run registry. Every run
/// executes on its own task; sync mode only waits for that task.
pub struct Engine {
    config: EngineConfig,
    tools: Arc<ToolRegistry>,
    graphs: RwLock<HashMap<GraphId, StoredGraph>>,
    runs: RunRegistry,
}

impl Engine {
    /// Engine over an existing tool registry.
    ///
    /// The registry's fallback name is authoritative; a differing
    /// `config.fallback_tool_name` is replaced with it.
    pub fn new(mut config: EngineConfig, tools: Arc<ToolRegistry>) -> Self {
        if config.fallback_tool_name != tools.fallback_name() {
            warn!(
                configured = %config.fallback_tool_name,
                registry = %tools.fallback_name(),
                "Fallback tool name differs from the registry, using the registry's"
            );
            config.fallback_tool_name = tools.fallback_name().to_string();
        }
        Self {
            config,
            tools,
            graphs: RwLock::new(HashMap::new()),
            runs: RunRegistry::new(),
        }
    }

    /// Engine with the built-in tools and the configured fallback name.
    pub fn with_builtins(config: EngineConfig) -> Self {
        let mut tools = ToolRegistry::with_fallback_name(config.fallback_tool_name.clone());
        tools.register_builtins();
        Self::new(config, Arc::new(tools))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Validate and store a graph definition.
    pub fn create_graph(&self, definition: GraphDefinition) -> Result<GraphId> {
        let graph = Graph::new(definition)?;
        let graph_id = GraphId::new();
        info!(
            graph_id = %graph_id,
            name = graph.name().unwrap_or("-"),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph created"
        );
        self.graphs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                graph_id.clone(),
                StoredGraph {
                    graph: Arc::new(graph),
                    created_at: Utc::now(),
                },
            );
        Ok(graph_id)
    }

    /// Store the code-review sample workflow.
    pub fn create_sample_graph(&self) -> Result<GraphId> {
        self.create_graph(sample::code_review_graph())
    }

    pub fn graph(&self, graph_id: &GraphId) -> Result<Arc<Graph>> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(graph_id)
            .map(|g| Arc::clone(&g.graph))
            .ok_or_else(|| StepflowError::GraphNotFound(graph_id.to_string()))
    }

    /// All stored graphs, oldest first.
    pub fn list_graphs(&self) -> Vec<GraphInfo> {
        let mut graphs: Vec<GraphInfo> = self
            .graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, stored)| GraphInfo {
                graph_id: id.clone(),
                name: stored.graph.name().map(str::to_string),
                entry: stored.graph.entry().to_string(),
                node_count: stored.graph.node_count(),
                edge_count: stored.graph.edge_count(),
                created_at: stored.created_at,
            })
            .collect();
        graphs.sort_by_key(|g| g.created_at);
        graphs
    }

    /// Start a run of a stored graph.
    ///
    /// The run is registered before this returns, so its id is immediately
    /// queryable. In sync mode the call returns once the run is terminal.
    pub async fn start_run(
        &self,
        graph_id: &GraphId,
        initial_state: Option<StateMap>,
        options: RunOptions,
    ) -> Result<RunId> {
        options.validate()?;
        let graph = self.graph(graph_id)?;
        let resolved = ResolvedOptions::resolve(&options, &graph, &self.config);

        let run_id = RunId::new();
        let handle = Arc::new(RunHandle::new(
            run_id.clone(),
            graph_id.clone(),
            initial_state.unwrap_or_default(),
        ));
        self.runs.insert(Arc::clone(&handle));

        let interpreter =
            Interpreter::new(graph, Arc::clone(&self.tools), Arc::clone(&handle), resolved);
        let task = tokio::spawn(interpreter.run());

        // A panicking tool must still leave the run in a terminal status, even
        // when a sync caller stops waiting.
        let supervisor = tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(run_id = %handle.run_id(), error = %e, "Run task aborted");
                handle.fail_if_running(&StepflowError::RunAborted(e.to_string()));
            }
        });

        if resolved.mode == ExecutionMode::Sync {
            if let Err(e) = supervisor.await {
                error!(run_id = %run_id, error = %e, "Run supervisor aborted");
            }
        }

        Ok(run_id)
    }

    /// Status, state and log so far of a run.
    pub fn get_run_state(&self, run_id: &RunId) -> Result<RunSnapshot> {
        Ok(self.runs.get(run_id)?.snapshot())
    }

    /// Ordered event stream of a run: replay, then live, ending after the
    /// terminal event.
    pub fn subscribe_run_log(&self, run_id: &RunId) -> Result<BoxStream<'static, RunEvent>> {
        Ok(self.runs.get(run_id)?.subscribe())
    }

    /// All runs, oldest first.
    pub fn list_runs(&self) -> Vec<RunInfo> {
        self.runs
            .list()
            .into_iter()
            .map(|handle| {
                let snap = handle.snapshot();
                RunInfo {
                    run_id: snap.run_id,
                    graph_id: snap.graph_id,
                    status: snap.status,
                    events: snap.log.len(),
                    created_at: snap.created_at,
                    updated_at: snap.updated_at,
                }
            })
            .collect()
    }
}
