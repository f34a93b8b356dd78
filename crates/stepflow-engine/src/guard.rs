use std::collections::BTreeMap;

/// Outcome of asking the guard to enter a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// The node may execute; `visit` is its 1-based visit number.
    Allowed { visit: u32 },
    /// The node already ran `visits` times against a cap of `max`.
    Exceeded { visits: u32, max: u32 },
}

/// Per-run visit counter bounding cyclic graphs.
///
/// A node with cap `N` executes at most `N` times; the attempt that would be
/// visit `N + 1` is rejected and not counted.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    visits: BTreeMap<String, u32>,
    default_max: u32,
}

impl LoopGuard {
    pub fn new(default_max: u32) -> Self {
        Self {
            visits: BTreeMap::new(),
            default_max: default_max.max(1),
        }
    }

    /// Record a visit to `node_id` unless it would exceed the cap.
    ///
    /// `node_max` overrides the run-wide default for this node.
    pub fn enter(&mut self, node_id: &str, node_max: Option<u32>) -> Visit {
        let max = node_max.unwrap_or(self.default_max);
        let count = self.visits.entry(node_id.to_string()).or_insert(0);
        if *count >= max {
            return Visit::Exceeded {
                visits: *count,
                max,
            };
        }
        *count += 1;
        Visit::Allowed { visit: *count }
    }

    pub fn visits(&self, node_id: &str) -> u32 {
        self.visits.get(node_id).copied().unwrap_or(0)
    }

    /// Visit counts of every node entered so far, ordered by node id.
    pub fn counts(&self) -> &BTreeMap<String, u32> {
        &self.visits
    }

    pub fn default_max(&self) -> u32 {
        self.default_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_allows_exactly_max_visits() {
        let mut guard = LoopGuard::new(3);
        assert_eq!(guard.enter("a", None), Visit::Allowed { visit: 1 });
        assert_eq!(guard.enter("a", None), Visit::Allowed { visit: 2 });
        assert_eq!(guard.enter("a", None), Visit::Allowed { visit: 3 });
        assert_eq!(guard.enter("a", None), Visit::Exceeded { visits: 3, max: 3 });
        // The rejected attempt is not counted.
        assert_eq!(guard.visits("a"), 3);
    }

    #[test]
    fn test_node_override() {
        let mut guard = LoopGuard::new(10);
        assert_eq!(guard.enter("a", Some(1)), Visit::Allowed { visit: 1 });
        assert_eq!(guard.enter("a", Some(1)), Visit::Exceeded { visits: 1, max: 1 });
        assert_eq!(guard.enter("b", None), Visit::Allowed { visit: 1 });
    }

    #[test]
    fn test_counts_are_per_node() {
        let mut guard = LoopGuard::new(2);
        guard.enter("x", None);
        guard.enter("y", None);
        guard.enter("x", None);
        assert_eq!(guard.counts().get("x"), Some(&2));
        assert_eq!(guard.counts().get("y"), Some(&1));
        assert_eq!(guard.visits("z"), 0);
    }

    #[test]
    fn test_zero_default_clamped() {
        let guard = LoopGuard::new(0);
        assert_eq!(guard.default_max(), 1);
    }
}
