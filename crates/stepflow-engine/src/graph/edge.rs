use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::state::StateStore;

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Condition that must be true to traverse this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Unconditional (default) edge, taken when no conditional edge matches.
    #[default]
    Always,
    /// Traverse if the expression holds against the current state.
    Conditional { expr: String },
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create a conditional edge.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Conditional { expr: expr.into() },
        }
    }

    pub fn is_unconditional(&self) -> bool {
        matches!(self.condition, EdgeCondition::Always)
    }
}

/// An outgoing edge with its condition parsed, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledEdge {
    pub to: String,
    pub guard: Option<EdgeGuard>,
}

#[derive(Debug, Clone)]
pub struct EdgeGuard {
    pub expr: String,
    pub condition: Condition,
}

impl CompiledEdge {
    /// Source text of the condition, if any.
    pub fn expr(&self) -> Option<&str> {
        self.guard.as_ref().map(|g| g.expr.as_str())
    }
}

/// Pick the edge to follow from a node's outgoing edges.
///
/// Conditional edges are tried in declaration order and the first that holds
/// wins; otherwise the unconditional edge, if any. `None` means a dead end.
pub fn select_edge<'a>(edges: &'a [CompiledEdge], state: &StateStore) -> Option<&'a CompiledEdge> {
    edges
        .iter()
        .filter_map(|e| e.guard.as_ref().map(|g| (e, g)))
        .find(|(_, g)| g.condition.evaluate(state))
        .map(|(e, _)| e)
        .or_else(|| edges.iter().find(|e| e.guard.is_none()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiled(to: &str, expr: Option<&str>) -> CompiledEdge {
        CompiledEdge {
            to: to.into(),
            guard: expr.map(|e| EdgeGuard {
                expr: e.into(),
                condition: Condition::parse(e).unwrap(),
            }),
        }
    }

    fn state(value: serde_json::Value) -> StateStore {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_edge_builders() {
        let e = Edge::always("a", "b");
        assert_eq!(e.from, "a");
        assert_eq!(e.to, "b");
        assert!(e.is_unconditional());

        let e = Edge::conditional("a", "c", "x > 1");
        assert!(!e.is_unconditional());
        assert!(matches!(e.condition, EdgeCondition::Conditional { ref expr } if expr == "x > 1"));
    }

    #[test]
    fn test_matching_conditional_beats_default() {
        // Default declared first must still lose to a matching conditional.
        let edges = vec![
            compiled("fallback", None),
            compiled("low", Some("score < 3")),
            compiled("high", Some("score > 5")),
        ];
        let s = state(json!({"score": 9}));
        assert_eq!(select_edge(&edges, &s).unwrap().to, "high");
    }

    #[test]
    fn test_first_matching_conditional_wins() {
        let edges = vec![
            compiled("first", Some("score > 1")),
            compiled("second", Some("score > 2")),
        ];
        let s = state(json!({"score": 9}));
        assert_eq!(select_edge(&edges, &s).unwrap().to, "first");
    }

    #[test]
    fn test_default_when_nothing_matches() {
        let edges = vec![compiled("cond", Some("score > 100")), compiled("default", None)];
        let s = state(json!({"score": 9}));
        assert_eq!(select_edge(&edges, &s).unwrap().to, "default");
    }

    #[test]
    fn test_dead_end() {
        let edges = vec![compiled("cond", Some("missing == 1"))];
        assert!(select_edge(&edges, &StateStore::new()).is_none());
        assert!(select_edge(&[], &StateStore::new()).is_none());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let edges = vec![
            compiled("a", Some("x == 1")),
            compiled("b", Some("x >= 1")),
            compiled("c", None),
        ];
        let s = state(json!({"x": 1}));
        for _ in 0..20 {
            assert_eq!(select_edge(&edges, &s).unwrap().to, "a");
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        let edge = Edge::conditional("a", "b", r#"status == "ok""#);
        let json = serde_json::to_string(&edge).unwrap();
        let parsed: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, edge);

        let bare: Edge = serde_json::from_value(json!({"from": "a", "to": "b"})).unwrap();
        assert!(bare.is_unconditional());
    }
}
