use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepflowError {
    // Graph errors
    #[error("Invalid graph: {0}")]
    Structural(String),

    #[error("Invalid condition `{expr}`: {message}")]
    ConditionParse { expr: String, message: String },

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    // Run errors
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Run aborted: {0}")]
    RunAborted(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    #[error("Fallback tool failed: {tool}: {message}")]
    FallbackFailed { tool: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StepflowError {
    /// Stable snake_case name recorded in run log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structural(_) => "structural_error",
            Self::ConditionParse { .. } => "condition_parse_error",
            Self::GraphNotFound(_) => "graph_not_found",
            Self::RunNotFound(_) => "run_not_found",
            Self::InvalidOptions(_) => "invalid_options",
            Self::NodeExecution { .. } => "node_execution_error",
            Self::RunAborted(_) => "run_aborted",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::ToolExecution { .. } | Self::ToolTimeout { .. } | Self::ToolValidation(_) => {
                "tool_execution_error"
            }
            Self::FallbackFailed { .. } => "fallback_failed",
            Self::Config(_) | Self::ConfigNotFound(_) => "config_error",
            Self::Gateway(_) => "gateway_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }

    /// Whether the safe-fallback policy may absorb this error.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_)
                | Self::ToolExecution { .. }
                | Self::ToolTimeout { .. }
                | Self::ToolValidation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StepflowError>;
