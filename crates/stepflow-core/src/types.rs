use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key/value state threaded through a run.
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Unique graph identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique run identifier, generated when a run is started.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    LoopLimitExceeded,
}

impl RunStatus {
    /// Terminal statuses are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::LoopLimitExceeded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::LoopLimitExceeded => "loop_limit_exceeded",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the fallback capability should degrade when a tool cannot produce output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Return a marker object recording the skipped tool.
    #[default]
    Skip,
    /// Return the tool input unchanged.
    EchoInput,
    /// Refuse to substitute output; the run fails.
    Abort,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    pub node_id: String,
}

impl ToolContext {
    pub fn new(run_id: RunId, node_id: impl Into<String>) -> Self {
        Self {
            run_id,
            node_id: node_id.into(),
        }
    }
}

/// Input handed to the fallback capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRequest {
    /// The tool that was requested.
    pub tool: String,
    /// Error kind of the original failure (`tool_not_found`, `tool_execution_error`).
    pub error_kind: String,
    /// Human-readable failure reason.
    pub reason: String,
    /// The input the original tool would have received.
    pub input: serde_json::Value,
    /// Declared degradation of the original tool.
    #[serde(default)]
    pub degradation: Degradation,
}

/// Inputs and outputs recorded for a single step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// One entry in a run's ordered event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Zero-based position in the run log.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    /// The interpreter began stepping.
    RunStarted {
        entry_node: String,
        initial_state: StateMap,
    },
    /// A node was executed.
    Step {
        step: u64,
        node_id: String,
        node_kind: String,
        summary: StepSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<RunStatus>,
    },
    /// A tool failure was absorbed by the fallback capability.
    ToolFallback {
        node_id: String,
        tool: String,
        fallback_tool: String,
        error_kind: String,
        reason: String,
    },
    /// An edge was followed.
    Transition {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
    /// A node exceeded its visit cap.
    LoopLimitExceeded {
        node_id: String,
        visits: u32,
        max_visits: u32,
    },
    /// The run finished successfully.
    RunCompleted {
        node_id: String,
        reason: String,
        total_steps: u64,
    },
    /// The run failed.
    RunFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
        error_kind: String,
        message: String,
    },
}

impl RunEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::Step { .. } => "step",
            Self::ToolFallback { .. } => "tool_fallback",
            Self::Transition { .. } => "transition",
            Self::LoopLimitExceeded { .. } => "loop_limit_exceeded",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    /// The terminal status this event explains, if it is a final event.
    pub fn terminal_status(&self) -> Option<RunStatus> {
        match self {
            Self::LoopLimitExceeded { .. } => Some(RunStatus::LoopLimitExceeded),
            Self::RunCompleted { .. } => Some(RunStatus::Completed),
            Self::RunFailed { .. } => Some(RunStatus::Failed),
            _ => None,
        }
    }
}
