use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

use stepflow_core::error::{Result, StepflowError};
use stepflow_core::traits::Tool;
use stepflow_core::types::{Degradation, ToolContext};

// ── EchoTool ────────────────────────────────────────────────────

pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Return the input under the `output` key."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move { Ok(serde_json::json!({ "output": input })) })
    }
    fn degradation(&self) -> Degradation {
        Degradation::EchoInput
    }
}

// ── PrintTool ───────────────────────────────────────────────────

pub struct PrintTool;

impl Tool for PrintTool {
    fn name(&self) -> &str {
        "print"
    }
    fn description(&self) -> &str {
        "Log the input and return an empty object."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            info!(run_id = %ctx.run_id, node = %ctx.node_id, input = %input, "print");
            Ok(serde_json::json!({}))
        })
    }
    fn degradation(&self) -> Degradation {
        Degradation::Skip
    }
}

// ── NoopTool ────────────────────────────────────────────────────

pub struct NoopTool;

impl Tool for NoopTool {
    fn name(&self) -> &str {
        "noop"
    }
    fn description(&self) -> &str {
        "Do nothing and return an empty object."
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async { Ok(serde_json::json!({})) })
    }
}

// ── PassthroughTool ─────────────────────────────────────────────

pub struct PassthroughTool;

impl Tool for PassthroughTool {
    fn name(&self) -> &str {
        "passthrough"
    }
    fn description(&self) -> &str {
        "Return the input unchanged."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move { Ok(input) })
    }
    fn degradation(&self) -> Degradation {
        Degradation::EchoInput
    }
}

// ── SumTool ─────────────────────────────────────────────────────

pub struct SumTool;

#[derive(Deserialize)]
struct SumInput {
    values: Vec<f64>,
}

impl Tool for SumTool {
    fn name(&self) -> &str {
        "sum"
    }
    fn description(&self) -> &str {
        "Sum the numbers in `values`."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: SumInput = serde_json::from_value(input)
                .map_err(|e| StepflowError::ToolValidation(e.to_string()))?;
            let total: f64 = p.values.iter().sum();
            Ok(serde_json::json!({ "sum": total }))
        })
    }
}

// ── LlmTool ─────────────────────────────────────────────────────

/// Prompt characters quoted back in the mock response.
const LLM_PROMPT_PREVIEW: usize = 20;

pub struct LlmTool;

#[derive(Deserialize)]
struct LlmInput {
    #[serde(default)]
    prompt: String,
}

impl Tool for LlmTool {
    fn name(&self) -> &str {
        "llm"
    }
    fn description(&self) -> &str {
        "Mock model call: answer `prompt` with a canned `llm_response`."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: LlmInput = serde_json::from_value(input)
                .map_err(|e| StepflowError::ToolValidation(e.to_string()))?;
            let preview: String = p.prompt.chars().take(LLM_PROMPT_PREVIEW).collect();
            Ok(serde_json::json!({
                "llm_response": format!("Mock response for: {preview}...")
            }))
        })
    }
}
