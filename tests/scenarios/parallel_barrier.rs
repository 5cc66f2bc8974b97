//! Scenario: a step is a barrier for all of its agents

use crate::helpers::*;
use agent_pipeline::core::{ExecutionStatus, ResultStatus};
use agent_pipeline::execution::StartOptions;
use std::sync::Arc;
use tokio::sync::Notify;

#[tokio::test]
async fn test_step_waits_for_slowest_agent() {
    let gate = Arc::new(Notify::new());
    let invoker = ScriptedInvoker::new().with("slow", Behavior::Gate(gate.clone()));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("barrier", &[(true, &["fast", "slow"]), (false, &["next"])]), StartOptions::default())
        .await
        .unwrap();

    let midway = h
        .until(id, |e| {
            e.step_result(1)
                .and_then(|r| r.agents.first())
                .map(|a| a.status == ResultStatus::Completed)
                .unwrap_or(false)
        })
        .await;

    // fast is done, slow is not: the step stays open and step 2 is absent
    let step = midway.step_result(1).unwrap();
    assert_eq!(step.status, ResultStatus::Running);
    assert_eq!(step.agents[1].status, ResultStatus::Running);
    assert!(midway.step_result(2).is_none());
    assert_eq!(midway.status, ExecutionStatus::Running);
    assert!(!h.invoked_types().contains(&"next".to_string()));

    gate.notify_one();
    let execution = h.engine.wait(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.results[0].status, ResultStatus::Completed);
    assert_eq!(execution.results[1].agents[0].agent_type, "next");
}

#[tokio::test]
async fn test_agents_in_a_step_run_concurrently() {
    let left = Arc::new(Notify::new());
    let right = Arc::new(Notify::new());
    let invoker = ScriptedInvoker::new()
        .with("left", Behavior::Gate(left.clone()))
        .with("right", Behavior::Gate(right.clone()));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("fanout", &[(true, &["left", "right"])]), StartOptions::default())
        .await
        .unwrap();

    // both agents are in flight at the same time
    h.until(id, |_| h.invoked().len() == 2).await;

    right.notify_one();
    left.notify_one();
    let execution = h.engine.wait(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    // results keep definition order regardless of finishing order
    let order: Vec<&str> = execution.results[0]
        .agents
        .iter()
        .map(|a| a.agent_type.as_str())
        .collect();
    assert_eq!(order, vec!["left", "right"]);
}

#[tokio::test]
async fn test_non_parallel_step_still_runs_every_agent() {
    let h = Harness::new(ScriptedInvoker::new());

    let id = h
        .engine
        .start(pipeline("flagged", &[(false, &["one", "two", "three"])]), StartOptions::default())
        .await
        .unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.results[0].agents.len(), 3);
    assert_eq!(h.invoked().len(), 3);
}
