//! Mock tools and graph fixtures shared by stepflow tests.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use stepflow_core::error::{Result, StepflowError};
use stepflow_core::traits::Tool;
use stepflow_core::types::{Degradation, ToolContext};

/// Always fails with a tool execution error.
pub struct FailingTool {
    name: String,
    degradation: Degradation,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            degradation: Degradation::Skip,
        }
    }

    /// Fails, but lets the fallback pass its input through.
    pub fn echoing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            degradation: Degradation::EchoInput,
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Err(StepflowError::ToolExecution {
                tool: self.name.clone(),
                message: "mock failure".into(),
            })
        })
    }

    fn degradation(&self) -> Degradation {
        self.degradation
    }
}

/// Fails and refuses any fallback output, so the run fails.
pub struct AbortingTool {
    name: String,
}

impl AbortingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Tool for AbortingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Err(StepflowError::ToolExecution {
                tool: self.name.clone(),
                message: "unrecoverable".into(),
            })
        })
    }

    fn degradation(&self) -> Degradation {
        Degradation::Abort
    }
}

/// Counts invocations and returns `{"calls": n}`.
pub struct CountingTool {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, readable after the tool moves into a registry.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Ok(json!({ "calls": calls })) })
    }
}

/// Sleeps before echoing its input; used to observe runs mid-flight.
pub struct SlowTool {
    name: String,
    delay: Duration,
    timeout_secs: Option<u64>,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(input)
        })
    }

    fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    fn degradation(&self) -> Degradation {
        Degradation::EchoInput
    }
}

/// Panics when executed, optionally after a delay.
#[derive(Default)]
pub struct PanickingTool {
    delay: Option<Duration>,
}

impl PanickingTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicking"
    }

    fn execute(&self, _input: Value, _ctx: ToolContext) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            panic!("mock panic")
        })
    }
}

// ── Graph fixtures ──────────────────────────────────────────────

/// `start (sum) -> done (terminal)`; sums `numbers` into `total`.
pub fn linear_graph() -> Value {
    json!({
        "name": "linear",
        "entry": "start",
        "nodes": [
            {
                "id": "start",
                "kind": "tool_call",
                "tool": "sum",
                "args": {"values": "{{numbers}}"},
                "output_key": "total"
            },
            {"id": "done", "kind": "terminal"}
        ],
        "edges": [{"from": "start", "to": "done"}]
    })
}

/// A single tool node with an unconditional edge to itself.
pub fn self_loop_graph(tool: &str, max_visits: Option<u32>) -> Value {
    let mut node = json!({"id": "spin", "kind": "tool_call", "tool": tool});
    if let Some(max) = max_visits {
        node["max_visits"] = json!(max);
    }
    json!({
        "entry": "spin",
        "nodes": [node],
        "edges": [{"from": "spin", "to": "spin"}]
    })
}

/// A branch with a default edge declared before a conditional one.
pub fn branching_graph() -> Value {
    json!({
        "entry": "decide",
        "nodes": [
            {"id": "decide", "kind": "branch"},
            {"id": "low", "kind": "terminal"},
            {"id": "high", "kind": "terminal"}
        ],
        "edges": [
            {"from": "decide", "to": "low"},
            {"from": "decide", "to": "high", "condition": {"type": "conditional", "expr": "score > 5"}}
        ]
    })
}

/// A single call to a tool nobody registered.
pub fn unknown_tool_graph() -> Value {
    json!({
        "start": "call",
        "nodes": {"call": "no_such_tool"},
        "edges": {}
    })
}

/// Write TOML to a temporary file that lives as long as the handle.
pub fn temp_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}
