//! Scenario: what observers see while a pipeline runs

use crate::helpers::*;
use agent_pipeline::core::{ExecutionStatus, ResultStatus};
use agent_pipeline::execution::{BroadcastEmitter, ExecutionEngine, ExecutionEvent, StartOptions};
use std::sync::Arc;

#[tokio::test]
async fn test_persisted_snapshots_only_move_forward() {
    let invoker = ScriptedInvoker::new()
        .with("a", Behavior::Succeed(ms(5)))
        .with("b", Behavior::Succeed(ms(10)));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("monotonic", &[(true, &["a", "b"]), (false, &["c"]), (false, &["d"])]), StartOptions::default())
        .await
        .unwrap();
    h.engine.wait(id).await.unwrap();

    let snapshots = h.store.snapshots();
    assert!(!snapshots.is_empty());
    for pair in snapshots.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        assert!(after.results.len() >= before.results.len());
        assert!(after.completed_steps() >= before.completed_steps());
        assert!(after.current_step >= before.current_step);
        // a terminal result never goes back to running
        for (old, new) in before.results.iter().zip(after.results.iter()) {
            for (x, y) in old.agents.iter().zip(new.agents.iter()) {
                if x.status.is_terminal() {
                    assert_eq!(x.status, y.status);
                }
            }
        }
    }
    assert_eq!(snapshots.last().unwrap().status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let h = Harness::with_store(ScriptedInvoker::new(), RecordingStore::failing(2), fast_config());

    let id = h
        .engine
        .start(pipeline("flaky-store", &[(false, &["a"]), (false, &["b"])]), StartOptions::default())
        .await
        .unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(h.engine.get_execution(id).await.unwrap(), execution);
}

#[tokio::test]
async fn test_broken_store_does_not_stop_the_run() {
    let h = Harness::with_store(
        ScriptedInvoker::new(),
        RecordingStore::failing(usize::MAX),
        fast_config(),
    );

    let id = h
        .engine
        .start(pipeline("no-store", &[(false, &["a"]), (false, &["b"])]), StartOptions::default())
        .await
        .unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(h.invoked_types(), vec!["a", "b"]);
    assert_eq!(h.emitter.kinds().last(), Some(&"execution_completed"));

    // only the initial record made it to the store
    let stored = h.engine.get_execution(id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Running);
    assert!(stored.results.is_empty());
}

#[tokio::test]
async fn test_chunks_arrive_in_order_before_completion() {
    let chunks: Vec<String> = (0..20).map(|i| format!("line {}\n", i)).collect();
    let invoker = ScriptedInvoker::new()
        .with("talker", Behavior::Chunks(chunks.clone()))
        .with("other", Behavior::Chunks(vec!["x".to_string(), "y".to_string()]));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("chatty", &[(true, &["talker", "other"])]), StartOptions::default())
        .await
        .unwrap();
    h.engine.wait(id).await.unwrap();

    let events = h.emitter.events();
    let texts_for = |agent: &str| -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StreamChunk(c) if c.agent_type == agent => Some(c.text.clone()),
                _ => None,
            })
            .collect()
    };
    assert_eq!(texts_for("talker"), chunks);
    assert_eq!(texts_for("other"), vec!["x", "y"]);

    let last_chunk = events
        .iter()
        .rposition(|e| matches!(e, ExecutionEvent::StreamChunk(c) if c.agent_type == "talker"))
        .unwrap();
    let completed = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::AgentCompleted { agent_type, .. } if agent_type == "talker"))
        .unwrap();
    assert!(last_chunk < completed);

    // chunks never land after the execution finished
    let finished = events.iter().position(|e| e.is_terminal()).unwrap();
    assert_eq!(finished, events.len() - 1);
}

#[tokio::test]
async fn test_broadcast_subscriber_sees_lifecycle() {
    let store = Arc::new(RecordingStore::default());
    let emitter = Arc::new(BroadcastEmitter::default());
    let mut rx = emitter.subscribe();
    let engine = ExecutionEngine::new(ScriptedInvoker::new(), store, emitter.clone())
        .with_config(fast_config());

    let id = engine
        .start(pipeline("broadcast", &[(false, &["a"])]), StartOptions::default())
        .await
        .unwrap();
    engine.wait(id).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(published) = rx.try_recv() {
        assert_eq!(published.channel, format!("execution:{}", id));
        kinds.push(published.event.kind());
    }
    assert_eq!(kinds.first(), Some(&"execution_started"));
    assert_eq!(kinds.last(), Some(&"execution_completed"));
    assert!(kinds.contains(&"agent_completed"));
}

#[tokio::test]
async fn test_failed_agent_result_carries_error() {
    let invoker = ScriptedInvoker::new().with("bad", Behavior::Fail(ms(1), "boom".to_string()));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("errors", &[(false, &["bad"])]), StartOptions::default())
        .await
        .unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    let agent = &execution.results[0].agents[0];
    assert_eq!(agent.status, ResultStatus::Failed);
    assert!(agent.completed_at.is_some());
    assert!(h.emitter.events().iter().any(|e| matches!(
        e,
        ExecutionEvent::AgentFailed { error, .. } if error == "API error: boom"
    )));
}

#[tokio::test]
async fn test_same_type_agents_are_told_apart() {
    let lines = vec!["a\n".to_string(), "b\n".to_string()];
    let h = Harness::new(ScriptedInvoker::new().with("twin", Behavior::Chunks(lines.clone())));

    let id = h
        .engine
        .start(pipeline("twins", &[(true, &["twin", "twin"])]), StartOptions::default())
        .await
        .unwrap();
    h.engine.wait(id).await.unwrap();

    let events = h.emitter.events();
    for agent in 0..2 {
        let texts: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StreamChunk(c) if c.agent == agent => Some(c.text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, lines);
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutionEvent::AgentCompleted { agent: a, .. } if *a == agent)));
    }
}
