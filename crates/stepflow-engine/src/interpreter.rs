use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use stepflow_core::config::{DeadEndPolicy, FallbackPolicy};
use stepflow_core::error::{Result, StepflowError};
use stepflow_core::types::{
    FallbackRequest, RunEventKind, RunStatus, StepSummary, ToolContext,
};
use stepflow_tools::ToolRegistry;

use crate::graph::{select_edge, Graph, Node, NodeKind};
use crate::guard::{LoopGuard, Visit};
use crate::run::{ResolvedOptions, RunHandle};
use crate::state::StateStore;

/// Steps a single run through its graph.
///
/// Starting from the entry node, each step checks the loop guard, executes the
/// node, records a `step` event, then follows the selected outgoing edge. The
/// interpreter owns the state and visit counters and publishes a copy of both
/// with every event, so readers never wait on a tool call.
pub struct Interpreter {
    graph: Arc<Graph>,
    tools: Arc<ToolRegistry>,
    handle: Arc<RunHandle>,
    options: ResolvedOptions,
}

impl Interpreter {
    pub fn new(
        graph: Arc<Graph>,
        tools: Arc<ToolRegistry>,
        handle: Arc<RunHandle>,
        options: ResolvedOptions,
    ) -> Self {
        Self {
            graph,
            tools,
            handle,
            options,
        }
    }

    /// Drive the run to a terminal status and return it.
    pub async fn run(self) -> RunStatus {
        let run_id = self.handle.run_id().clone();
        let mut state = StateStore::from_map(self.handle.snapshot().state);
        let mut guard = LoopGuard::new(self.options.max_visits_per_node);
        let mut current = self.graph.entry().to_string();
        let mut step: u64 = 0;

        self.handle.set_status(RunStatus::Running);
        info!(
            run_id = %run_id,
            graph_id = %self.handle.graph_id(),
            entry = %current,
            max_visits = self.options.max_visits_per_node,
            "Run started"
        );
        self.handle.publish(
            RunEventKind::RunStarted {
                entry_node: current.clone(),
                initial_state: state.data().clone(),
            },
            state.data(),
            guard.counts(),
        );

        loop {
            let Some(node) = self.graph.node(&current) else {
                // Unreachable for a validated graph.
                let err = StepflowError::Structural(format!("node '{}' not found", current));
                return self.fail(Some(&current), &err, &state, &guard);
            };

            match guard.enter(&node.id, node.max_visits) {
                Visit::Allowed { visit } => {
                    debug!(run_id = %run_id, node_id = %node.id, visit, "Entering node");
                }
                Visit::Exceeded { visits, max } => {
                    warn!(
                        run_id = %run_id,
                        node_id = %node.id,
                        visits,
                        max_visits = max,
                        "Loop limit exceeded, halting run"
                    );
                    self.handle.publish(
                        RunEventKind::LoopLimitExceeded {
                            node_id: node.id.clone(),
                            visits,
                            max_visits: max,
                        },
                        state.data(),
                        guard.counts(),
                    );
                    return RunStatus::LoopLimitExceeded;
                }
            }

            step += 1;
            let mut summary = StepSummary::default();
            if let Err(e) = self.execute_node(node, &mut state, &mut summary).await {
                error!(run_id = %run_id, node_id = %node.id, error = %e, "Node failed");
                self.handle.publish(
                    RunEventKind::Step {
                        step,
                        node_id: node.id.clone(),
                        node_kind: node.kind.name().to_string(),
                        summary,
                        status: Some(RunStatus::Failed),
                    },
                    state.data(),
                    guard.counts(),
                );
                return self.fail(Some(&node.id), &e, &state, &guard);
            }

            let is_terminal = matches!(node.kind, NodeKind::Terminal);
            self.handle.publish(
                RunEventKind::Step {
                    step,
                    node_id: node.id.clone(),
                    node_kind: node.kind.name().to_string(),
                    summary,
                    status: is_terminal.then_some(RunStatus::Completed),
                },
                state.data(),
                guard.counts(),
            );

            if is_terminal {
                return self.complete(&node.id, "terminal_node", step, &state, &guard);
            }

            match select_edge(self.graph.outgoing(&node.id), &state) {
                Some(edge) => {
                    debug!(
                        run_id = %run_id,
                        from = %node.id,
                        to = %edge.to,
                        condition = edge.expr().unwrap_or("default"),
                        "Following edge"
                    );
                    self.handle.publish(
                        RunEventKind::Transition {
                            from: node.id.clone(),
                            to: edge.to.clone(),
                            condition: edge.expr().map(str::to_string),
                        },
                        state.data(),
                        guard.counts(),
                    );
                    current = edge.to.clone();
                }
                None => match self.options.dead_end {
                    DeadEndPolicy::Complete => {
                        debug!(run_id = %run_id, node_id = %node.id, "No edge matched, completing");
                        return self.complete(&node.id, "dead_end", step, &state, &guard);
                    }
                    DeadEndPolicy::Fail => {
                        let err = StepflowError::NodeExecution {
                            node: node.id.clone(),
                            message: "no outgoing edge matched".into(),
                        };
                        return self.fail(Some(&node.id), &err, &state, &guard);
                    }
                },
            }
        }
    }

    async fn execute_node(
        &self,
        node: &Node,
        state: &mut StateStore,
        summary: &mut StepSummary,
    ) -> Result<()> {
        let NodeKind::ToolCall {
            tool,
            args,
            output_key,
        } = &node.kind
        else {
            return Ok(());
        };

        let input = match args {
            Some(template) => state.render(template),
            None => Value::Object(state.data().clone()),
        };
        summary.tool = Some(tool.clone());
        summary.input = Some(input.clone());

        let ctx = ToolContext::new(self.handle.run_id().clone(), node.id.as_str());
        let output = match self.tools.invoke(tool, input.clone(), ctx.clone()).await {
            Ok(output) => output,
            Err(e) if e.is_tool_failure() && self.options.fallback == FallbackPolicy::Enabled => {
                self.handle.append(RunEventKind::ToolFallback {
                    node_id: node.id.clone(),
                    tool: tool.clone(),
                    fallback_tool: self.tools.fallback_name().to_string(),
                    error_kind: e.kind().to_string(),
                    reason: e.to_string(),
                });
                let request = FallbackRequest {
                    tool: tool.clone(),
                    error_kind: e.kind().to_string(),
                    reason: e.to_string(),
                    input,
                    degradation: self.tools.degradation_of(tool),
                };
                self.tools.invoke_fallback(request, ctx).await?
            }
            Err(e) => return Err(e),
        };

        summary.output = Some(output.clone());
        state.apply_output(&node.id, output_key.as_deref(), output);
        Ok(())
    }

    fn complete(
        &self,
        node_id: &str,
        reason: &str,
        total_steps: u64,
        state: &StateStore,
        guard: &LoopGuard,
    ) -> RunStatus {
        info!(
            run_id = %self.handle.run_id(),
            node_id,
            reason,
            total_steps,
            "Run completed"
        );
        self.handle.publish(
            RunEventKind::RunCompleted {
                node_id: node_id.to_string(),
                reason: reason.to_string(),
                total_steps,
            },
            state.data(),
            guard.counts(),
        );
        RunStatus::Completed
    }

    fn fail(
        &self,
        node_id: Option<&str>,
        err: &StepflowError,
        state: &StateStore,
        guard: &LoopGuard,
    ) -> RunStatus {
        error!(
            run_id = %self.handle.run_id(),
            node_id = node_id.unwrap_or("-"),
            kind = err.kind(),
            error = %err,
            "Run failed"
        );
        self.handle.publish(
            RunEventKind::RunFailed {
                node_id: node_id.map(str::to_string),
                error_kind: err.kind().to_string(),
                message: err.to_string(),
            },
            state.data(),
            guard.counts(),
        );
        RunStatus::Failed
    }
}
