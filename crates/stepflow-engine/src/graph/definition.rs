use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::edge::Edge;
use super::node::Node;

/// Declarative graph definition accepted by `create_graph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Id of the node execution starts from.
    pub entry: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Graph-wide visit cap, overridden by per-node and per-run caps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_visits_per_node: Option<u32>,
}

impl GraphDefinition {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            name: None,
            entry: entry.into(),
            nodes: vec![],
            edges: vec![],
            max_visits_per_node: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_max_visits(mut self, max: u32) -> Self {
        self.max_visits_per_node = Some(max);
        self
    }
}

/// Shorthand form: `{start, nodes: {name: tool}, edges: {from: to}}`.
///
/// Every node becomes a tool call merging its output into state and every
/// edge is unconditional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactGraph {
    pub start: String,
    pub nodes: BTreeMap<String, String>,
    #[serde(default)]
    pub edges: BTreeMap<String, String>,
}

impl From<CompactGraph> for GraphDefinition {
    fn from(compact: CompactGraph) -> Self {
        Self {
            name: None,
            entry: compact.start,
            nodes: compact
                .nodes
                .into_iter()
                .map(|(id, tool)| Node::tool_call(id, tool))
                .collect(),
            edges: compact
                .edges
                .into_iter()
                .map(|(from, to)| Edge::always(from, to))
                .collect(),
            max_visits_per_node: None,
        }
    }
}

/// Either accepted definition shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GraphPayload {
    Full(GraphDefinition),
    Compact(CompactGraph),
}

impl From<GraphPayload> for GraphDefinition {
    fn from(payload: GraphPayload) -> Self {
        match payload {
            GraphPayload::Full(def) => def,
            GraphPayload::Compact(compact) => compact.into(),
        }
    }
}
