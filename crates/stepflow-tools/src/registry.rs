use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use stepflow_core::config::DEFAULT_FALLBACK_TOOL;
use stepflow_core::error::{Result, StepflowError};
use stepflow_core::traits::Tool;
use stepflow_core::types::{Degradation, FallbackRequest, ToolContext};

use crate::fallback::DefaultFallback;

/// Registry of available tools plus the reserved fallback capability.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    fallback_name: String,
}

impl ToolRegistry {
    /// Create a registry holding only the default fallback under the reserved name.
    pub fn new() -> Self {
        Self::with_fallback_name(DEFAULT_FALLBACK_TOOL)
    }

    /// Create a registry whose fallback lives under a custom reserved name.
    pub fn with_fallback_name(name: impl Into<String>) -> Self {
        let fallback_name = name.into();
        let mut registry = Self {
            tools: HashMap::new(),
            fallback_name: fallback_name.clone(),
        };
        registry.register(DefaultFallback::new(fallback_name));
        registry
    }

    /// Register a tool. Replaces any tool already registered under the same name.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            debug!(tool = %name, "Replaced registered tool");
        }
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Name the fallback capability is registered under.
    pub fn fallback_name(&self) -> &str {
        &self.fallback_name
    }

    /// Declared degradation of a tool; unknown tools degrade by skipping.
    pub fn degradation_of(&self, name: &str) -> Degradation {
        self.get(name)
            .map(|t| t.degradation())
            .unwrap_or_default()
    }

    /// Invoke a tool by name.
    ///
    /// Fails with `ToolNotFound` for unregistered names. Any failure raised by
    /// the tool itself surfaces as a tool execution error.
    pub async fn invoke(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<serde_json::Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| StepflowError::ToolNotFound(name.to_string()))?;

        let result = match tool.timeout_secs() {
            Some(secs) => {
                let timeout = std::time::Duration::from_secs(secs);
                match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StepflowError::ToolTimeout {
                        tool: name.to_string(),
                        timeout_secs: secs,
                    }),
                }
            }
            None => tool.execute(input, ctx).await,
        };

        result.map_err(|e| {
            if e.is_tool_failure() {
                e
            } else {
                StepflowError::ToolExecution {
                    tool: name.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }

    /// Invoke the fallback capability for a failed tool call.
    pub async fn invoke_fallback(
        &self,
        request: FallbackRequest,
        ctx: ToolContext,
    ) -> Result<serde_json::Value> {
        let fallback_name = self.fallback_name.clone();
        warn!(
            tool = %request.tool,
            fallback = %fallback_name,
            reason = %request.reason,
            "Invoking fallback capability"
        );

        let input = serde_json::to_value(&request)?;
        self.invoke(&fallback_name, input, ctx)
            .await
            .map_err(|e| StepflowError::FallbackFailed {
                tool: fallback_name,
                message: e.to_string(),
            })
    }

    /// Create a registry with the built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register the built-in tools into an existing registry.
    pub fn register_builtins(&mut self) {
        // ── General (6) ─────────────────────────────────────────
        self.register(crate::builtin::basic::EchoTool);
        self.register(crate::builtin::basic::PrintTool);
        self.register(crate::builtin::basic::NoopTool);
        self.register(crate::builtin::basic::PassthroughTool);
        self.register(crate::builtin::basic::SumTool);
        self.register(crate::builtin::basic::LlmTool);

        // ── Code review sample (4) ──────────────────────────────
        self.register(crate::builtin::review::ExtractCodeTool);
        self.register(crate::builtin::review::CheckComplexityTool);
        self.register(crate::builtin::review::DetectIssuesTool);
        self.register(crate::builtin::review::SuggestImprovementsTool);
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;
    use stepflow_core::types::RunId;

    struct BrokenTool;

    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(async { Err(StepflowError::Config("boom".into())) })
        }
        fn degradation(&self) -> Degradation {
            Degradation::EchoInput
        }
    }

    struct SleepyTool;

    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(json!({}))
            })
        }
        fn timeout_secs(&self) -> Option<u64> {
            Some(1)
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(RunId::new(), "n1")
    }

    #[test]
    fn test_new_registers_fallback() {
        let registry = ToolRegistry::new();
        assert!(registry.contains(DEFAULT_FALLBACK_TOOL));
        assert_eq!(registry.fallback_name(), DEFAULT_FALLBACK_TOOL);
    }

    #[test]
    fn test_custom_fallback_name() {
        let registry = ToolRegistry::with_fallback_name("safe_default");
        assert!(registry.contains("safe_default"));
        assert!(!registry.contains(DEFAULT_FALLBACK_TOOL));
    }

    #[test]
    fn test_builtins_listed_sorted() {
        let registry = ToolRegistry::with_builtins();
        let names = registry.list();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"print"));
        assert!(names.contains(&"llm"));
        assert!(names.contains(&"check_complexity"));
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", json!({}), ctx()).await.unwrap_err();
        assert!(matches!(err, StepflowError::ToolNotFound(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn test_invoke_wraps_tool_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(BrokenTool);
        let err = registry.invoke("broken", json!({}), ctx()).await.unwrap_err();
        assert_eq!(err.kind(), "tool_execution_error");
        assert_eq!(registry.degradation_of("broken"), Degradation::EchoInput);
        assert_eq!(registry.degradation_of("missing"), Degradation::Skip);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_applies_declared_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SleepyTool);
        let err = registry.invoke("sleepy", json!({}), ctx()).await.unwrap_err();
        assert!(matches!(err, StepflowError::ToolTimeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_invoke_fallback_missing_capability() {
        let mut registry = ToolRegistry::new();
        registry.unregister(DEFAULT_FALLBACK_TOOL);
        let request = FallbackRequest {
            tool: "x".into(),
            error_kind: "tool_not_found".into(),
            reason: "Tool not found: x".into(),
            input: json!({}),
            degradation: Degradation::Skip,
        };
        let err = registry.invoke_fallback(request, ctx()).await.unwrap_err();
        assert_eq!(err.kind(), "fallback_failed");
    }
}
