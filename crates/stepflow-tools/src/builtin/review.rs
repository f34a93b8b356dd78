//! Rule-based tools backing the sample code-review workflow.
//!
//! Each tool reads its fields from the run state and returns a mapping that
//! is merged back into it, so the workflow loops on `complexity_score`.

use futures::future::BoxFuture;
use serde::Deserialize;

use stepflow_core::error::{Result, StepflowError};
use stepflow_core::traits::Tool;
use stepflow_core::types::ToolContext;

const HIGH_COMPLEXITY: &str = "High complexity detected";
const TODO_FOUND: &str = "Found TODO comments";

fn parse<T: for<'de> Deserialize<'de>>(input: serde_json::Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| StepflowError::ToolValidation(e.to_string()))
}

// ── ExtractCodeTool ─────────────────────────────────────────────

pub struct ExtractCodeTool;

#[derive(Deserialize)]
struct ExtractInput {
    #[serde(default)]
    raw_code: String,
}

impl Tool for ExtractCodeTool {
    fn name(&self) -> &str {
        "extract_code"
    }
    fn description(&self) -> &str {
        "List function signatures found in `raw_code`."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: ExtractInput = parse(input)?;
            let functions: Vec<&str> = p
                .raw_code
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with("def ") || l.starts_with("fn ") || l.starts_with("pub fn "))
                .collect();
            Ok(serde_json::json!({ "functions": functions }))
        })
    }
}

// ── CheckComplexityTool ─────────────────────────────────────────

pub struct CheckComplexityTool;

#[derive(Deserialize)]
struct ComplexityInput {
    #[serde(default)]
    raw_code: String,
    #[serde(default)]
    complexity_score: Option<i64>,
}

impl Tool for CheckComplexityTool {
    fn name(&self) -> &str {
        "check_complexity"
    }
    fn description(&self) -> &str {
        "Score `raw_code` complexity from 1 to 10, keeping an existing score."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: ComplexityInput = parse(input)?;
            // A score lowered by suggest_improvements is kept across loop iterations.
            let score = match p.complexity_score {
                Some(existing) => existing,
                None => {
                    let lines = p.raw_code.lines().filter(|l| !l.trim().is_empty()).count();
                    lines.clamp(1, 10) as i64
                }
            };
            Ok(serde_json::json!({ "complexity_score": score }))
        })
    }
}

// ── DetectIssuesTool ────────────────────────────────────────────

pub struct DetectIssuesTool;

#[derive(Deserialize)]
struct IssuesInput {
    #[serde(default)]
    raw_code: String,
    #[serde(default)]
    complexity_score: i64,
}

impl Tool for DetectIssuesTool {
    fn name(&self) -> &str {
        "detect_issues"
    }
    fn description(&self) -> &str {
        "Flag high complexity and TODO comments."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: IssuesInput = parse(input)?;
            let mut issues = Vec::new();
            if p.complexity_score > 7 {
                issues.push(HIGH_COMPLEXITY);
            }
            if p.raw_code.to_lowercase().contains("todo") {
                issues.push(TODO_FOUND);
            }
            Ok(serde_json::json!({ "issues": issues }))
        })
    }
}

// ── SuggestImprovementsTool ─────────────────────────────────────

pub struct SuggestImprovementsTool;

#[derive(Deserialize)]
struct SuggestInput {
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default = "default_complexity")]
    complexity_score: i64,
}

fn default_complexity() -> i64 {
    10
}

impl Tool for SuggestImprovementsTool {
    fn name(&self) -> &str {
        "suggest_improvements"
    }
    fn description(&self) -> &str {
        "Suggest fixes for detected issues and lower the complexity score by 2."
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let p: SuggestInput = parse(input)?;
            let mut suggestions = Vec::new();
            if p.issues.iter().any(|i| i == HIGH_COMPLEXITY) {
                suggestions.push("Refactor long functions into smaller ones");
            }
            if p.issues.iter().any(|i| i == TODO_FOUND) {
                suggestions.push("Resolve pending TODOs");
            }
            Ok(serde_json::json!({
                "suggestions": suggestions,
                "complexity_score": (p.complexity_score - 2).max(0),
            }))
        })
    }
}
