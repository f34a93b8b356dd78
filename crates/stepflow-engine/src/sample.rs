use crate::graph::{Edge, GraphDefinition, Node};

/// Complexity above which the review loops through `improve`.
pub const IMPROVE_THRESHOLD: i64 = 5;

/// The code-review workflow.
///
/// ```text
/// extract -> complexity -> issues --(complexity_score > 5)--> improve -> complexity
///                                 \--(default)--> done
/// ```
///
/// Seed the run with `raw_code`. Each pass through `improve` lowers the score
/// by 2, so the loop ends on its own well before the default visit cap.
pub fn code_review_graph() -> GraphDefinition {
    GraphDefinition::new("extract")
        .with_name("code_review")
        .node(
            Node::tool_call("extract", "extract_code")
                .with_description("List the functions in the submitted code"),
        )
        .node(
            Node::tool_call("complexity", "check_complexity")
                .with_description("Score complexity from 1 to 10"),
        )
        .node(
            Node::tool_call("issues", "detect_issues")
                .with_description("Flag high complexity and TODO comments"),
        )
        .node(
            Node::tool_call("improve", "suggest_improvements")
                .with_description("Suggest fixes and lower the score"),
        )
        .node(Node::terminal("done"))
        .edge(Edge::always("extract", "complexity"))
        .edge(Edge::always("complexity", "issues"))
        .edge(Edge::conditional(
            "issues",
            "improve",
            format!("complexity_score > {IMPROVE_THRESHOLD}"),
        ))
        .edge(Edge::always("issues", "done"))
        .edge(Edge::always("improve", "complexity"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn test_sample_graph_is_valid() {
        let graph = Graph::new(code_review_graph()).unwrap();
        assert_eq!(graph.entry(), "extract");
        assert_eq!(graph.name(), Some("code_review"));
        assert_eq!(graph.outgoing("issues").len(), 2);
        assert_eq!(graph.outgoing("issues")[0].expr(), Some("complexity_score > 5"));
    }
}
