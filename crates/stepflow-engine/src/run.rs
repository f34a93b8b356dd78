use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use stepflow_core::config::{DeadEndPolicy, EngineConfig, ExecutionMode, FallbackPolicy};
use stepflow_core::error::{Result, StepflowError};
use stepflow_core::types::{GraphId, RunEvent, RunEventKind, RunId, RunStatus, StateMap};

use crate::graph::Graph;

/// Per-run overrides of the engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_visits_per_node: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_end: Option<DeadEndPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackPolicy>,
}

impl RunOptions {
    pub fn sync() -> Self {
        Self {
            mode: Some(ExecutionMode::Sync),
            ..Self::default()
        }
    }

    pub fn background() -> Self {
        Self {
            mode: Some(ExecutionMode::Background),
            ..Self::default()
        }
    }

    pub fn with_max_visits(mut self, max: u32) -> Self {
        self.max_visits_per_node = Some(max);
        self
    }

    pub fn with_dead_end(mut self, policy: DeadEndPolicy) -> Self {
        self.dead_end = Some(policy);
        self
    }

    pub fn with_fallback(mut self, policy: FallbackPolicy) -> Self {
        self.fallback = Some(policy);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_visits_per_node == Some(0) {
            return Err(StepflowError::InvalidOptions(
                "max_visits_per_node must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}

/// Effective settings for one run after layering options over config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub max_visits_per_node: u32,
    pub mode: ExecutionMode,
    pub dead_end: DeadEndPolicy,
    pub fallback: FallbackPolicy,
}

impl ResolvedOptions {
    /// Run options win over the graph definition, which wins over config.
    pub fn resolve(options: &RunOptions, graph: &Graph, config: &EngineConfig) -> Self {
        Self {
            max_visits_per_node: options
                .max_visits_per_node
                .or(graph.max_visits_per_node())
                .unwrap_or(config.max_visits_per_node),
            mode: options.mode.unwrap_or(config.mode),
            dead_end: options.dead_end.unwrap_or(config.dead_end),
            fallback: options.fallback.unwrap_or(config.fallback),
        }
    }
}

/// Point-in-time copy of a run, safe to hand to any reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub graph_id: GraphId,
    pub status: RunStatus,
    pub state: StateMap,
    pub log: Vec<RunEvent>,
    pub visit_counts: BTreeMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RunRecord {
    status: RunStatus,
    state: StateMap,
    log: Vec<RunEvent>,
    visit_counts: BTreeMap<String, u32>,
    updated_at: DateTime<Utc>,
}

/// Shared handle to a single run.
///
/// The interpreter is the only writer. Readers take snapshots or subscribe to
/// the log; the watch channel carries the current log length so subscribers
/// wake on every append.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    graph_id: GraphId,
    created_at: DateTime<Utc>,
    record: RwLock<RunRecord>,
    notify: watch::Sender<usize>,
}

impl RunHandle {
    pub fn new(run_id: RunId, graph_id: GraphId, initial_state: StateMap) -> Self {
        let now = Utc::now();
        let (notify, _) = watch::channel(0);
        Self {
            run_id,
            graph_id,
            created_at: now,
            record: RwLock::new(RunRecord {
                status: RunStatus::Pending,
                state: initial_state,
                log: Vec::new(),
                visit_counts: BTreeMap::new(),
                updated_at: now,
            }),
            notify,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn graph_id(&self) -> &GraphId {
        &self.graph_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> RunStatus {
        self.read().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Move to a non-terminal status. Terminal statuses are absorbing.
    pub fn set_status(&self, status: RunStatus) -> bool {
        let mut record = self.write();
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.updated_at = Utc::now();
        true
    }

    /// Append an event without touching state.
    ///
    /// Returns the sequence number, or `None` when the run is already
    /// terminal. A terminal event sets the matching status under the same
    /// lock, so no reader sees one without the other.
    pub fn append(&self, kind: RunEventKind) -> Option<u64> {
        self.commit(kind, None)
    }

    /// Publish the interpreter's state and visit counts together with an event.
    pub fn publish(
        &self,
        kind: RunEventKind,
        state: &StateMap,
        visit_counts: &BTreeMap<String, u32>,
    ) -> Option<u64> {
        self.commit(kind, Some((state, visit_counts)))
    }

    fn commit(
        &self,
        kind: RunEventKind,
        published: Option<(&StateMap, &BTreeMap<String, u32>)>,
    ) -> Option<u64> {
        let len = {
            let mut record = self.write();
            if record.status.is_terminal() {
                return None;
            }
            let now = Utc::now();
            if let Some((state, counts)) = published {
                record.state = state.clone();
                record.visit_counts = counts.clone();
            }
            if let Some(status) = kind.terminal_status() {
                record.status = status;
            }
            let seq = record.log.len() as u64;
            record.log.push(RunEvent {
                seq,
                timestamp: now,
                kind,
            });
            record.updated_at = now;
            record.log.len()
        };
        self.notify.send_replace(len);
        Some(len as u64 - 1)
    }

    /// Record a failure unless the run already finished.
    pub fn fail_if_running(&self, error: &StepflowError) -> bool {
        self.append(RunEventKind::RunFailed {
            node_id: None,
            error_kind: error.kind().to_string(),
            message: error.to_string(),
        })
        .is_some()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let record = self.read();
        RunSnapshot {
            run_id: self.run_id.clone(),
            graph_id: self.graph_id.clone(),
            status: record.status,
            state: record.state.clone(),
            log: record.log.clone(),
            visit_counts: record.visit_counts.clone(),
            created_at: self.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn log_len(&self) -> usize {
        self.read().log.len()
    }

    /// Stream the log: everything recorded so far, then live events.
    ///
    /// The stream ends after the terminal event. Dropping it has no effect on
    /// the run.
    pub fn subscribe(self: &Arc<Self>) -> BoxStream<'static, RunEvent> {
        let rx = self.notify.subscribe();
        stream::unfold(
            (Arc::clone(self), rx, 0usize),
            |(handle, mut rx, next)| async move {
                loop {
                    rx.borrow_and_update();
                    let (event, finished) = {
                        let record = handle.read();
                        (
                            record.log.get(next).cloned(),
                            record.status.is_terminal() && next >= record.log.len(),
                        )
                    };
                    if let Some(event) = event {
                        return Some((event, (handle, rx, next + 1)));
                    }
                    if finished || rx.changed().await.is_err() {
                        return None;
                    }
                }
            },
        )
        .boxed()
    }

    fn read(&self) -> RwLockReadGuard<'_, RunRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn handle() -> Arc<RunHandle> {
        Arc::new(RunHandle::new(
            RunId::from_string("run-1"),
            GraphId::from_string("graph-1"),
            StateMap::new(),
        ))
    }

    fn transition(from: &str, to: &str) -> RunEventKind {
        RunEventKind::Transition {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    fn completed(node: &str) -> RunEventKind {
        RunEventKind::RunCompleted {
            node_id: node.into(),
            reason: "terminal_node".into(),
            total_steps: 1,
        }
    }

    #[test]
    fn test_options_validation() {
        assert!(RunOptions::default().validate().is_ok());
        let err = RunOptions::default().with_max_visits(0).validate().unwrap_err();
        assert_eq!(err.kind(), "invalid_options");
    }

    #[test]
    fn test_options_deserialize() {
        let opts: RunOptions =
            serde_json::from_value(json!({"max_visits_per_node": 4, "mode": "sync"})).unwrap();
        assert_eq!(opts.max_visits_per_node, Some(4));
        assert_eq!(opts.mode, Some(ExecutionMode::Sync));
        assert_eq!(opts.dead_end, None);
    }

    #[test]
    fn test_new_handle_is_pending() {
        let h = handle();
        let snap = h.snapshot();
        assert_eq!(snap.status, RunStatus::Pending);
        assert!(snap.log.is_empty());
        assert_eq!(snap.run_id.0, "run-1");
    }

    #[test]
    fn test_append_assigns_sequence() {
        let h = handle();
        assert_eq!(h.append(transition("a", "b")), Some(0));
        assert_eq!(h.append(transition("b", "c")), Some(1));
        let log = h.snapshot().log;
        assert_eq!(log[0].seq, 0);
        assert_eq!(log[1].seq, 1);
    }

    #[test]
    fn test_terminal_event_sets_status_and_seals_log() {
        let h = handle();
        h.set_status(RunStatus::Running);
        assert!(h.append(completed("end")).is_some());
        assert_eq!(h.status(), RunStatus::Completed);

        assert!(h.append(transition("x", "y")).is_none());
        assert!(!h.set_status(RunStatus::Running));
        assert!(!h.fail_if_running(&StepflowError::Gateway("late".into())));
        assert_eq!(h.status(), RunStatus::Completed);
        assert_eq!(h.log_len(), 1);
    }

    #[test]
    fn test_publish_updates_state() {
        let h = handle();
        let mut state = StateMap::new();
        state.insert("k".into(), json!(1));
        let mut counts = BTreeMap::new();
        counts.insert("a".to_string(), 2);
        h.publish(transition("a", "b"), &state, &counts);

        let snap = h.snapshot();
        assert_eq!(snap.state.get("k"), Some(&json!(1)));
        assert_eq!(snap.visit_counts.get("a"), Some(&2));
    }

    #[test]
    fn test_fail_if_running() {
        let h = handle();
        h.set_status(RunStatus::Running);
        assert!(h.fail_if_running(&StepflowError::NodeExecution {
            node: "n".into(),
            message: "boom".into(),
        }));
        let snap = h.snapshot();
        assert_eq!(snap.status, RunStatus::Failed);
        assert!(matches!(
            snap.log.last().unwrap().kind,
            RunEventKind::RunFailed { ref error_kind, .. } if error_kind == "node_execution_error"
        ));
    }

    #[tokio::test]
    async fn test_subscribe_replays_then_follows() {
        let h = handle();
        h.append(transition("a", "b"));

        let writer = Arc::clone(&h);
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.append(transition("b", "c"));
            writer.append(completed("c"));
        });

        let events: Vec<RunEvent> = h.subscribe().collect().await;
        task.await.unwrap();

        assert_eq!(events.len(), 3);
        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(events[2].kind.name(), "run_completed");
    }

    #[tokio::test]
    async fn test_subscribe_after_finish_is_finite() {
        let h = handle();
        h.append(transition("a", "b"));
        h.append(completed("b"));

        let first: Vec<RunEvent> = h.subscribe().collect().await;
        let second: Vec<RunEvent> = h.subscribe().collect().await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
