use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};

use stepflow_core::config::{DeadEndPolicy, EngineConfig, FallbackPolicy};
use stepflow_core::types::{RunEvent, RunEventKind, RunStatus, StateMap};
use stepflow_engine::{Engine, GraphDefinition, GraphPayload, RunOptions};
use stepflow_test_utils::{FailingTool, SlowTool};
use stepflow_tools::ToolRegistry;

fn definition(value: Value) -> GraphDefinition {
    serde_json::from_value::<GraphPayload>(value)
        .expect("graph payload")
        .into()
}

fn state(value: Value) -> Option<StateMap> {
    Some(serde_json::from_value(value).expect("state object"))
}

fn terminal_events(log: &[RunEvent]) -> usize {
    log.iter()
        .filter(|e| e.kind.terminal_status().is_some())
        .count()
}

#[tokio::test]
async fn every_run_ends_with_exactly_one_terminal_event() {
    let engine = Engine::with_builtins(EngineConfig::default());
    let graphs = [
        stepflow_test_utils::linear_graph(),
        stepflow_test_utils::branching_graph(),
        stepflow_test_utils::unknown_tool_graph(),
        stepflow_test_utils::self_loop_graph("noop", Some(2)),
    ];

    for graph in graphs {
        let id = engine.create_graph(definition(graph)).unwrap();
        let run_id = engine
            .start_run(&id, state(json!({"numbers": [1], "score": 3})), RunOptions::sync())
            .await
            .unwrap();
        let snap = engine.get_run_state(&run_id).unwrap();

        assert!(snap.status.is_terminal());
        assert_eq!(terminal_events(&snap.log), 1);
        let last = snap.log.last().unwrap();
        assert_eq!(last.kind.terminal_status(), Some(snap.status));
    }
}

#[tokio::test]
async fn self_loop_with_cap_three_runs_three_times() {
    let engine = Engine::with_builtins(EngineConfig::default());
    let id = engine
        .create_graph(definition(stepflow_test_utils::self_loop_graph("noop", Some(3))))
        .unwrap();
    let run_id = engine.start_run(&id, None, RunOptions::sync()).await.unwrap();

    let snap = engine.get_run_state(&run_id).unwrap();
    assert_eq!(snap.status, RunStatus::LoopLimitExceeded);
    let steps = snap
        .log
        .iter()
        .filter(|e| matches!(e.kind, RunEventKind::Step { .. }))
        .count();
    assert_eq!(steps, 3);
}

#[tokio::test]
async fn global_cap_applies_when_nothing_overrides_it() {
    let config = EngineConfig {
        max_visits_per_node: 2,
        ..EngineConfig::default()
    };
    let engine = Engine::with_builtins(config);
    let id = engine
        .create_graph(definition(stepflow_test_utils::self_loop_graph("noop", None)))
        .unwrap();
    let run_id = engine.start_run(&id, None, RunOptions::sync()).await.unwrap();
    assert_eq!(
        engine.get_run_state(&run_id).unwrap().visit_counts.get("spin"),
        Some(&2)
    );
}

#[tokio::test]
async fn matching_conditional_edge_beats_default() {
    let engine = Engine::with_builtins(EngineConfig::default());
    let id = engine
        .create_graph(definition(stepflow_test_utils::branching_graph()))
        .unwrap();

    for (score, expected) in [(9, "high"), (2, "low")] {
        let run_id = engine
            .start_run(&id, state(json!({"score": score})), RunOptions::sync())
            .await
            .unwrap();
        let log = engine.get_run_state(&run_id).unwrap().log;
        assert!(matches!(
            log.last().unwrap().kind,
            RunEventKind::RunCompleted { ref node_id, .. } if node_id == expected
        ));
    }
}

#[tokio::test]
async fn missing_key_takes_default_edge() {
    let engine = Engine::with_builtins(EngineConfig::default());
    let id = engine
        .create_graph(definition(stepflow_test_utils::branching_graph()))
        .unwrap();
    let run_id = engine.start_run(&id, None, RunOptions::sync()).await.unwrap();
    let snap = engine.get_run_state(&run_id).unwrap();
    assert_eq!(snap.status, RunStatus::Completed);
    assert!(matches!(
        snap.log.last().unwrap().kind,
        RunEventKind::RunCompleted { ref node_id, .. } if node_id == "low"
    ));
}

#[tokio::test]
async fn failing_tool_absorbed_unless_fallback_disabled() {
    let mut tools = ToolRegistry::new();
    tools.register(FailingTool::new("flaky"));
    let tools = Arc::new(tools);
    let graph = json!({"start": "call", "nodes": {"call": "flaky"}});

    let engine = Engine::new(EngineConfig::default(), Arc::clone(&tools));
    let id = engine.create_graph(definition(graph.clone())).unwrap();
    let run_id = engine.start_run(&id, None, RunOptions::sync()).await.unwrap();
    let snap = engine.get_run_state(&run_id).unwrap();
    assert_eq!(snap.status, RunStatus::Completed);
    assert_eq!(snap.state["tool_execution"], json!("flaky"));

    let strict = EngineConfig {
        fallback: FallbackPolicy::Disabled,
        ..EngineConfig::default()
    };
    let engine = Engine::new(strict, tools);
    let id = engine.create_graph(definition(graph)).unwrap();
    let run_id = engine.start_run(&id, None, RunOptions::sync()).await.unwrap();
    let snap = engine.get_run_state(&run_id).unwrap();
    assert_eq!(snap.status, RunStatus::Failed);
    assert!(matches!(
        snap.log.last().unwrap().kind,
        RunEventKind::RunFailed { ref error_kind, .. } if error_kind == "tool_execution_error"
    ));
}

#[tokio::test]
async fn dead_end_policy_from_run_options() {
    let engine = Engine::with_builtins(EngineConfig::default());
    let id = engine
        .create_graph(definition(json!({
            "entry": "a",
            "nodes": [{"id": "a", "kind": "branch"}, {"id": "b", "kind": "terminal"}],
            "edges": [{"from": "a", "to": "b", "condition": {"type": "conditional", "expr": "go"}}]
        })))
        .unwrap();

    let run_id = engine
        .start_run(&id, None, RunOptions::sync().with_dead_end(DeadEndPolicy::Fail))
        .await
        .unwrap();
    assert_eq!(
        engine.get_run_state(&run_id).unwrap().status,
        RunStatus::Failed
    );

    let run_id = engine
        .start_run(&id, state(json!({"go": true})), RunOptions::sync())
        .await
        .unwrap();
    assert_eq!(
        engine.get_run_state(&run_id).unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn concurrent_runs_are_independent() {
    let mut tools = ToolRegistry::new();
    tools.register(SlowTool::new("slow", Duration::from_millis(30)));
    let engine = Arc::new(Engine::new(EngineConfig::default(), Arc::new(tools)));
    let id = engine
        .create_graph(definition(json!({
            "entry": "work",
            "nodes": [
                {"id": "work", "kind": "tool_call", "tool": "slow", "args": {"tag": "{{tag}}"}, "output_key": "echo"},
                {"id": "end", "kind": "terminal"}
            ],
            "edges": [{"from": "work", "to": "end"}]
        })))
        .unwrap();

    let mut run_ids = Vec::new();
    for tag in 0..8 {
        let run_id = engine
            .start_run(&id, state(json!({"tag": tag})), RunOptions::background())
            .await
            .unwrap();
        run_ids.push((tag, run_id));
    }

    for (tag, run_id) in run_ids {
        let events: Vec<RunEvent> = engine.subscribe_run_log(&run_id).unwrap().collect().await;
        assert_eq!(events.last().unwrap().kind.name(), "run_completed");
        let snap = engine.get_run_state(&run_id).unwrap();
        assert_eq!(snap.state["echo"], json!({"tag": tag}));
    }
    assert_eq!(engine.list_runs().len(), 8);
}

#[tokio::test]
async fn dropping_subscription_does_not_affect_run() {
    let mut tools = ToolRegistry::new();
    tools.register(SlowTool::new("slow", Duration::from_millis(20)));
    let engine = Engine::new(EngineConfig::default(), Arc::new(tools));
    let id = engine
        .create_graph(definition(json!({"start": "a", "nodes": {"a": "slow", "b": "slow"}, "edges": {"a": "b"}})))
        .unwrap();
    let run_id = engine
        .start_run(&id, None, RunOptions::background())
        .await
        .unwrap();

    let mut stream = engine.subscribe_run_log(&run_id).unwrap();
    let first = stream.next().await.unwrap();
    assert_eq!(first.kind.name(), "run_started");
    drop(stream);

    let rest: Vec<RunEvent> = engine.subscribe_run_log(&run_id).unwrap().collect().await;
    assert_eq!(rest.last().unwrap().kind.name(), "run_completed");
}

#[tokio::test]
async fn compact_graph_resolves_print_and_llm_builtins() {
    let engine = Engine::with_builtins(EngineConfig::default());
    let id = engine
        .create_graph(definition(json!({
            "start": "ask",
            "nodes": {"ask": "llm", "log": "print"},
            "edges": {"ask": "log"}
        })))
        .unwrap();
    let run_id = engine
        .start_run(&id, state(json!({"prompt": "hello"})), RunOptions::sync())
        .await
        .unwrap();

    let snap = engine.get_run_state(&run_id).unwrap();
    assert_eq!(snap.status, RunStatus::Completed);
    assert_eq!(snap.state["llm_response"], json!("Mock response for: hello..."));
    assert!(!snap
        .log
        .iter()
        .any(|e| matches!(e.kind, RunEventKind::ToolFallback { .. })));
}
