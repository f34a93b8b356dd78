use futures::future::BoxFuture;

use stepflow_core::error::{Result, StepflowError};
use stepflow_core::traits::Tool;
use stepflow_core::types::{Degradation, FallbackRequest, ToolContext};

/// Safe default capability used when a requested tool is missing or fails.
///
/// Takes a serialized [`FallbackRequest`] and degrades according to the
/// failed tool's declared [`Degradation`].
pub struct DefaultFallback {
    name: String,
}

impl DefaultFallback {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Tool for DefaultFallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Substitutes output for a missing or failing tool."
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let request: FallbackRequest = serde_json::from_value(input)
                .map_err(|e| StepflowError::ToolValidation(e.to_string()))?;

            match request.degradation {
                Degradation::Skip => {
                    let input_keys: Vec<&String> = request
                        .input
                        .as_object()
                        .map(|o| o.keys().collect())
                        .unwrap_or_default();
                    Ok(serde_json::json!({
                        "tool_execution": request.tool,
                        "status": "fallback_executed",
                        "error_kind": request.error_kind,
                        "original_input_keys": input_keys,
                    }))
                }
                Degradation::EchoInput => Ok(request.input),
                Degradation::Abort => Err(StepflowError::ToolExecution {
                    tool: request.tool,
                    message: format!("declared no fallback output ({})", request.reason),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use stepflow_core::types::RunId;

    fn request(degradation: Degradation) -> serde_json::Value {
        serde_json::to_value(FallbackRequest {
            tool: "summarize".into(),
            error_kind: "tool_not_found".into(),
            reason: "Tool not found: summarize".into(),
            input: json!({"text": "hello", "lang": "en"}),
            degradation,
        })
        .unwrap()
    }

    fn ctx() -> ToolContext {
        ToolContext::new(RunId::new(), "n1")
    }

    #[tokio::test]
    async fn test_skip_returns_marker() {
        let fallback = DefaultFallback::new("__fallback__");
        let out = fallback.execute(request(Degradation::Skip), ctx()).await.unwrap();
        assert_eq!(out["tool_execution"], "summarize");
        assert_eq!(out["status"], "fallback_executed");
        assert_eq!(out["original_input_keys"], json!(["lang", "text"]));
    }

    #[tokio::test]
    async fn test_echo_returns_input() {
        let fallback = DefaultFallback::new("__fallback__");
        let out = fallback
            .execute(request(Degradation::EchoInput), ctx())
            .await
            .unwrap();
        assert_eq!(out, json!({"text": "hello", "lang": "en"}));
    }

    #[tokio::test]
    async fn test_abort_fails() {
        let fallback = DefaultFallback::new("__fallback__");
        let err = fallback
            .execute(request(Degradation::Abort), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, StepflowError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_rejects_malformed_request() {
        let fallback = DefaultFallback::new("__fallback__");
        let err = fallback.execute(json!("nope"), ctx()).await.unwrap_err();
        assert!(matches!(err, StepflowError::ToolValidation(_)));
    }
}
