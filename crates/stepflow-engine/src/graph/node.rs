use serde::{Deserialize, Serialize};

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the graph.
    pub id: String,
    /// What the node does when executed.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Per-node visit cap overriding the run-level setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_visits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Kind-specific node parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Invoke a registered tool.
    ToolCall {
        tool: String,
        /// Argument template; `{{key}}` placeholders resolve from state.
        /// When absent the tool receives the whole state.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<serde_json::Value>,
        /// State key receiving the tool output. When absent a mapping
        /// output is merged into state.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_key: Option<String>,
    },
    /// Decision point: only selects an outgoing edge.
    Branch,
    /// Completes the run.
    Terminal,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::Branch => "branch",
            Self::Terminal => "terminal",
        }
    }
}

impl Node {
    fn with_kind(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            max_visits: None,
            description: None,
        }
    }

    /// Create a tool-call node that receives the whole state.
    pub fn tool_call(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            NodeKind::ToolCall {
                tool: tool.into(),
                args: None,
                output_key: None,
            },
        )
    }

    /// Create a branch node.
    pub fn branch(id: impl Into<String>) -> Self {
        Self::with_kind(id, NodeKind::Branch)
    }

    /// Create a terminal node.
    pub fn terminal(id: impl Into<String>) -> Self {
        Self::with_kind(id, NodeKind::Terminal)
    }

    /// Set the argument template (tool-call nodes only).
    pub fn with_args(mut self, template: serde_json::Value) -> Self {
        if let NodeKind::ToolCall { ref mut args, .. } = self.kind {
            *args = Some(template);
        }
        self
    }

    /// Set the output key (tool-call nodes only).
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        if let NodeKind::ToolCall {
            ref mut output_key, ..
        } = self.kind
        {
            *output_key = Some(key.into());
        }
        self
    }

    /// Set the per-node visit cap.
    pub fn with_max_visits(mut self, max: u32) -> Self {
        self.max_visits = Some(max);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
