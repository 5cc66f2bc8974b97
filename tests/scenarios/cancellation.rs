//! Scenario: cancelling a running execution

use crate::helpers::*;
use agent_pipeline::core::{ExecutionStatus, ResultStatus};
use agent_pipeline::execution::{CancelOutcome, StartOptions};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

fn agent_running(step: usize) -> impl Fn(&agent_pipeline::core::Execution) -> bool {
    move |e| {
        e.step_result(step)
            .map(|r| !r.agents.is_empty() && r.agents.iter().all(|a| a.status == ResultStatus::Running))
            .unwrap_or(false)
    }
}

#[tokio::test]
async fn test_cancel_during_step() {
    let gate = Arc::new(Notify::new());
    let invoker = ScriptedInvoker::new().with("blocked", Behavior::Gate(gate));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("cancel-me", &[(false, &["blocked"]), (false, &["after"])]), StartOptions::default())
        .await
        .unwrap();
    h.until(id, agent_running(1)).await;

    let outcome = h.engine.cancel(id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);

    let execution = h.engine.get_execution(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.completed_at.is_some());
    assert_eq!(execution.results.len(), 1);
    assert_eq!(execution.results[0].status, ResultStatus::Failed);

    let agent = &execution.results[0].agents[0];
    assert_eq!(agent.status, ResultStatus::Failed);
    assert!(agent.error.as_deref().unwrap().starts_with("cancelled"));

    assert_eq!(h.invoked_types(), vec!["blocked"]);
    assert_eq!(h.emitter.kinds().last(), Some(&"execution_cancelled"));
}

#[tokio::test]
async fn test_cancel_twice_reports_same_status() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(ScriptedInvoker::new().with("blocked", Behavior::Gate(gate)));

    let id = h
        .engine
        .start(pipeline("twice", &[(false, &["blocked"])]), StartOptions::default())
        .await
        .unwrap();
    h.until(id, agent_running(1)).await;

    let first = h.engine.cancel(id).await.unwrap();
    let snapshot = h.engine.get_execution(id).await.unwrap();
    let second = h.engine.cancel(id).await.unwrap();

    assert_eq!(first, CancelOutcome::Cancelled);
    assert_eq!(second, CancelOutcome::AlreadyTerminal(ExecutionStatus::Cancelled));
    assert_eq!(first.status(), second.status());

    // the second call changed nothing
    assert_eq!(h.engine.get_execution(id).await.unwrap(), snapshot);
    let cancelled_events = h
        .emitter
        .kinds()
        .into_iter()
        .filter(|k| *k == "execution_cancelled")
        .count();
    assert_eq!(cancelled_events, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_agree() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(ScriptedInvoker::new().with("blocked", Behavior::Gate(gate)));

    let id = h
        .engine
        .start(pipeline("racing", &[(true, &["blocked"])]), StartOptions::default())
        .await
        .unwrap();
    h.until(id, agent_running(1)).await;

    let requests: Vec<_> = (0..4)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.cancel(id).await.unwrap() })
        })
        .collect();
    let mut outcomes = Vec::new();
    for request in requests {
        outcomes.push(request.await.unwrap());
    }

    assert!(outcomes.iter().all(|o| o.status() == ExecutionStatus::Cancelled));
    // exactly one request did the cancelling
    let winners = outcomes
        .iter()
        .filter(|o| **o == CancelOutcome::Cancelled)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_agent_ignoring_cancel_is_aborted_after_grace() {
    let h = Harness::with_config(
        ScriptedInvoker::new().with("deaf", Behavior::Hang),
        fast_config().with_cancel_grace(50),
    );

    let id = h
        .engine
        .start(pipeline("deaf", &[(false, &["deaf"]), (false, &["after"])]), StartOptions::default())
        .await
        .unwrap();
    h.until(id, agent_running(1)).await;

    let started = Instant::now();
    let outcome = h.engine.cancel(id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    let execution = h.engine.wait(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.results.len(), 1);
    assert!(!h.invoked_types().contains(&"after".to_string()));
}

#[tokio::test]
async fn test_result_after_cancel_is_ignored() {
    let h = Harness::with_config(
        ScriptedInvoker::new().with("stubborn", Behavior::Stubborn(ms(100))),
        fast_config().with_cancel_grace(1000),
    );

    let id = h
        .engine
        .start(pipeline("late", &[(false, &["stubborn"])]), StartOptions::default())
        .await
        .unwrap();
    h.until(id, agent_running(1)).await;

    h.engine.cancel(id).await.unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    let agent = &execution.results[0].agents[0];
    assert_eq!(agent.status, ResultStatus::Failed);
    assert!(agent.error.as_deref().unwrap().starts_with("cancelled"));
    assert!(!h.emitter.kinds().contains(&"agent_completed"));
}

#[tokio::test]
async fn test_cancel_finished_execution_is_noop() {
    let h = Harness::new(ScriptedInvoker::new());
    let id = h
        .engine
        .start(pipeline("done", &[(false, &["quick"])]), StartOptions::default())
        .await
        .unwrap();
    let finished = h.engine.wait(id).await.unwrap();

    let outcome = h.engine.cancel(id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::AlreadyTerminal(ExecutionStatus::Completed));
    assert_eq!(h.engine.get_execution(id).await.unwrap(), finished);
}

#[tokio::test]
async fn test_simulated_run_can_be_cancelled() {
    let h = Harness::with_config(ScriptedInvoker::new(), fast_config().with_simulate_delay(10_000));

    let id = h
        .engine
        .start(pipeline("sim", &[(true, &["a", "b"]), (false, &["c"])]), StartOptions::simulated())
        .await
        .unwrap();
    h.until(id, agent_running(1)).await;

    assert_eq!(h.engine.cancel(id).await.unwrap(), CancelOutcome::Cancelled);
    let execution = h.engine.get_execution(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.results.len(), 1);
    assert!(execution.results[0]
        .agents
        .iter()
        .all(|a| a.status == ResultStatus::Failed));
}

#[tokio::test]
async fn test_cancel_while_start_is_persisting() {
    let h = Harness::with_store(
        ScriptedInvoker::new(),
        RecordingStore::slow_create(ms(100)),
        fast_config(),
    );

    // cancel as soon as the record shows up, while start is still inside create
    let engine = h.engine.clone();
    let canceller = tokio::spawn(async move {
        loop {
            let listed = engine.list_executions(None, 10).await.unwrap();
            if let Some(execution) = listed.first() {
                return (execution.id, engine.cancel(execution.id).await.unwrap());
            }
            tokio::time::sleep(ms(1)).await;
        }
    });

    let id = h
        .engine
        .start(pipeline("early", &[(false, &["a"]), (false, &["b"])]), StartOptions::default())
        .await
        .unwrap();
    let (cancelled_id, outcome) = canceller.await.unwrap();
    assert_eq!(cancelled_id, id);
    assert_eq!(outcome, CancelOutcome::Cancelled);

    let execution = h.engine.wait(id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.results.is_empty());

    let stored = h.engine.get_execution(id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Cancelled);
    assert!(h.invoked().is_empty());
    assert_eq!(
        h.emitter
            .kinds()
            .into_iter()
            .filter(|k| *k == "execution_cancelled")
            .count(),
        1
    );
}
