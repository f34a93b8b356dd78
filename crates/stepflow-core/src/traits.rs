use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Degradation, ToolContext};

/// A named capability invoked by `tool_call` nodes.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (unique within a registry).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Execute the tool with structured input.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Optional deadline in seconds. `None` means the engine imposes none.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }

    /// How the fallback capability should degrade if this tool fails.
    fn degradation(&self) -> Degradation {
        Degradation::Skip
    }
}
