//! Graph model: nodes, edges and their structural validation.
//!
//! A workflow is a directed graph of `Node`s connected by `Edge`s, declared as
//! a [`GraphDefinition`]. [`Graph::new`] validates the definition and parses
//! every edge condition; only a `Graph` can be handed to a run, so an invalid
//! definition never starts executing. Cycles are allowed and are bounded at
//! runtime by the loop guard.

pub mod definition;
pub mod edge;
pub mod node;

use std::collections::{HashMap, HashSet};

use stepflow_core::error::{Result, StepflowError};

pub use definition::{CompactGraph, GraphDefinition, GraphPayload};
pub use edge::{select_edge, CompiledEdge, Edge, EdgeCondition, EdgeGuard};
pub use node::{Node, NodeKind};

use crate::condition::Condition;

/// A validated, ready-to-run graph.
#[derive(Debug, Clone)]
pub struct Graph {
    definition: GraphDefinition,
    nodes: HashMap<String, Node>,
    outgoing: HashMap<String, Vec<CompiledEdge>>,
}

impl Graph {
    /// Validate a definition and compile its edge conditions.
    pub fn new(definition: GraphDefinition) -> Result<Self> {
        definition.validate()?;

        let nodes = definition
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect();

        let mut outgoing: HashMap<String, Vec<CompiledEdge>> = HashMap::new();
        for edge in &definition.edges {
            let guard = match &edge.condition {
                EdgeCondition::Always => None,
                EdgeCondition::Conditional { expr } => Some(EdgeGuard {
                    expr: expr.clone(),
                    condition: Condition::parse(expr).map_err(|e| {
                        StepflowError::Structural(format!(
                            "edge '{}' -> '{}': {}",
                            edge.from, edge.to, e
                        ))
                    })?,
                }),
            };
            outgoing
                .entry(edge.from.clone())
                .or_default()
                .push(CompiledEdge {
                    to: edge.to.clone(),
                    guard,
                });
        }

        Ok(Self {
            definition,
            nodes,
            outgoing,
        })
    }

    pub fn entry(&self) -> &str {
        &self.definition.entry
    }

    pub fn name(&self) -> Option<&str> {
        self.definition.name.as_deref()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.definition.edges.len()
    }

    /// Outgoing edges of a node in declaration order.
    pub fn outgoing(&self, id: &str) -> &[CompiledEdge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Graph-wide visit cap, if the definition sets one.
    pub fn max_visits_per_node(&self) -> Option<u32> {
        self.definition.max_visits_per_node
    }

    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }
}

impl GraphDefinition {
    /// Check the structural invariants of this definition.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(StepflowError::Structural("node id must not be empty".into()));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(StepflowError::Structural(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            if node.max_visits == Some(0) {
                return Err(StepflowError::Structural(format!(
                    "node '{}': max_visits must be a positive integer",
                    node.id
                )));
            }
            if let NodeKind::ToolCall { tool, .. } = &node.kind {
                if tool.trim().is_empty() {
                    return Err(StepflowError::Structural(format!(
                        "node '{}': tool name must not be empty",
                        node.id
                    )));
                }
            }
        }

        if !ids.contains(self.entry.as_str()) {
            return Err(StepflowError::Structural(format!(
                "entry node '{}' does not exist",
                self.entry
            )));
        }

        if self.max_visits_per_node == Some(0) {
            return Err(StepflowError::Structural(
                "max_visits_per_node must be a positive integer".into(),
            ));
        }

        let mut defaults = HashSet::new();
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(StepflowError::Structural(format!(
                        "edge '{}' -> '{}' references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    )));
                }
            }
            if edge.is_unconditional() && !defaults.insert(edge.from.as_str()) {
                return Err(StepflowError::Structural(format!(
                    "node '{}' has more than one unconditional outgoing edge",
                    edge.from
                )));
            }
            if let EdgeCondition::Conditional { expr } = &edge.condition {
                Condition::parse(expr).map_err(|e| {
                    StepflowError::Structural(format!(
                        "edge '{}' -> '{}': {}",
                        edge.from, edge.to, e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> GraphDefinition {
        GraphDefinition::new("start")
            .node(Node::tool_call("start", "echo"))
            .node(Node::branch("decide"))
            .node(Node::terminal("end"))
            .edge(Edge::always("start", "decide"))
            .edge(Edge::conditional("decide", "start", "retry == true"))
            .edge(Edge::always("decide", "end"))
    }

    fn structural_message(def: GraphDefinition) -> String {
        match Graph::new(def) {
            Err(StepflowError::Structural(msg)) => msg,
            other => panic!("expected structural error, got {other:?}"),
        }
    }

    #[test]
    fn test_graph_construction() {
        let graph = Graph::new(linear()).unwrap();
        assert_eq!(graph.entry(), "start");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.outgoing("decide").len(), 2);
        assert_eq!(graph.outgoing("decide")[0].expr(), Some("retry == true"));
        assert!(graph.outgoing("end").is_empty());
        assert!(graph.node("missing").is_none());
    }

    #[test]
    fn test_missing_entry_rejected() {
        let mut def = linear();
        def.entry = "nowhere".into();
        assert!(structural_message(def).contains("entry node 'nowhere'"));
    }

    #[test]
    fn test_unknown_edge_target_rejected() {
        let def = linear().edge(Edge::conditional("end", "ghost", "x == 1"));
        assert!(structural_message(def).contains("unknown node 'ghost'"));
    }

    #[test]
    fn test_unknown_edge_source_rejected() {
        let def = linear().edge(Edge::always("ghost", "end"));
        assert!(structural_message(def).contains("unknown node 'ghost'"));
    }

    #[test]
    fn test_two_default_edges_rejected() {
        let def = linear().edge(Edge::always("decide", "start"));
        assert!(structural_message(def).contains("more than one unconditional"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let def = linear().node(Node::terminal("end"));
        assert!(structural_message(def).contains("duplicate node id 'end'"));
    }

    #[test]
    fn test_bad_condition_rejected() {
        let def = linear().edge(Edge::conditional("end", "start", "a =="));
        assert!(structural_message(def).contains("edge 'end' -> 'start'"));
    }

    #[test]
    fn test_zero_caps_rejected() {
        let def = linear().node(Node::terminal("other").with_max_visits(0));
        assert!(structural_message(def).contains("max_visits"));

        let def = linear().with_max_visits(0);
        assert!(structural_message(def).contains("max_visits_per_node"));
    }

    #[test]
    fn test_empty_tool_rejected() {
        let def = linear().node(Node::tool_call("blank", " "));
        assert!(structural_message(def).contains("tool name"));
    }

    #[test]
    fn test_self_loop_allowed() {
        let def = GraphDefinition::new("loop")
            .node(Node::tool_call("loop", "noop"))
            .edge(Edge::always("loop", "loop"));
        assert!(Graph::new(def).is_ok());
    }
}
