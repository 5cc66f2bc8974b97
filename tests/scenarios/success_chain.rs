//! Scenario: pipelines that run to completion

use crate::helpers::*;
use agent_pipeline::core::{ExecutionStatus, ResultStatus};
use agent_pipeline::execution::{ExecutionEvent, StartOptions};

/// Step 1 runs A alone, step 2 runs B and C in parallel
#[tokio::test]
async fn test_simulated_two_step_pipeline() {
    let h = Harness::new(ScriptedInvoker::new());
    let definition = pipeline("feature", &[(false, &["A"]), (true, &["B", "C"])]);

    let id = h
        .engine
        .start(definition, StartOptions::simulated())
        .await
        .unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.current_step, 2);
    assert_eq!(execution.total_steps, 2);
    assert!(execution.completed_at.is_some());

    let shape: Vec<(usize, ResultStatus, Vec<(String, ResultStatus)>)> = execution
        .results
        .iter()
        .map(|r| {
            (
                r.step,
                r.status,
                r.agents
                    .iter()
                    .map(|a| (a.agent_type.clone(), a.status))
                    .collect(),
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            (1, ResultStatus::Completed, vec![("A".to_string(), ResultStatus::Completed)]),
            (
                2,
                ResultStatus::Completed,
                vec![
                    ("B".to_string(), ResultStatus::Completed),
                    ("C".to_string(), ResultStatus::Completed)
                ]
            ),
        ]
    );

    // simulate mode never reaches the real invoker
    assert!(h.invoked().is_empty());

    // the store agrees with the driver
    assert_eq!(h.engine.get_execution(id).await.unwrap(), execution);
}

#[tokio::test]
async fn test_every_step_produces_one_result() {
    const WORKER: &[&str] = &["worker"];

    for n in 1..=4 {
        let h = Harness::new(ScriptedInvoker::new());
        let steps: Vec<(bool, &[&str])> = (0..n).map(|_| (false, WORKER)).collect();

        let id = h
            .engine
            .start(pipeline("chain", &steps), StartOptions::default())
            .await
            .unwrap();
        let execution = h.engine.wait(id).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.results.len(), n);
        assert_eq!(execution.current_step, n);
        assert!(execution
            .results
            .iter()
            .all(|r| r.status == ResultStatus::Completed));
        assert_eq!(h.invoked().len(), n);
    }
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let h = Harness::new(ScriptedInvoker::new());
    let id = h
        .engine
        .start(pipeline("single", &[(false, &["solo"])]), StartOptions::default())
        .await
        .unwrap();
    h.engine.wait(id).await.unwrap();

    assert_eq!(
        h.emitter.kinds(),
        vec![
            "execution_started",
            "step_started",
            "agent_started",
            "agent_completed",
            "step_completed",
            "execution_completed",
        ]
    );

    let expected_channel = format!("execution:{}", id);
    assert!(h.emitter.channels().iter().all(|c| *c == expected_channel));
    assert!(h.emitter.events().iter().all(|e| e.execution_id() == id));
}

#[tokio::test]
async fn test_steps_advance_in_order() {
    let invoker = ScriptedInvoker::new()
        .with("first", Behavior::Succeed(ms(20)))
        .with("second", Behavior::Succeed(ms(5)));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(
            pipeline("ordered", &[(false, &["first"]), (false, &["second"]), (true, &["third", "fourth"])]),
            StartOptions::default(),
        )
        .await
        .unwrap();
    h.engine.wait(id).await.unwrap();

    let invoked = h.invoked();
    let steps: Vec<usize> = invoked.iter().map(|i| i.step).collect();
    assert_eq!(steps, vec![1, 2, 3, 3]);
    assert_eq!(&h.invoked_types()[..2], &["first".to_string(), "second".to_string()]);

    // step 2 starts only after step 1 completed
    let events = h.emitter.events();
    let position = |pred: &dyn Fn(&ExecutionEvent) -> bool| events.iter().position(|e| pred(e)).unwrap();
    let step1_done = position(&|e| matches!(e, ExecutionEvent::StepCompleted { step: 1, .. }));
    let step2_start = position(&|e| matches!(e, ExecutionEvent::StepStarted { step: 2, .. }));
    assert!(step1_done < step2_start);
}

#[tokio::test]
async fn test_agent_reported_session_replaces_assigned_one() {
    let invoker = ScriptedInvoker::new().with("reporter", Behavior::Session("agent-42".to_string()));
    let h = Harness::new(invoker);

    let id = h
        .engine
        .start(pipeline("sessions", &[(true, &["reporter", "quiet"])]), StartOptions::default())
        .await
        .unwrap();
    let execution = h.engine.wait(id).await.unwrap();

    let agents = &execution.results[0].agents;
    assert_eq!(agents[0].session_id.as_deref(), Some("agent-42"));

    // the quiet agent keeps the id the engine handed it
    let assigned = h
        .invoked()
        .into_iter()
        .find(|i| i.agent_type == "quiet")
        .unwrap()
        .session_id;
    assert_eq!(agents[1].session_id.as_deref(), Some(assigned.as_str()));
    assert!(agents.iter().all(|a| a.started_at.is_some() && a.completed_at.is_some()));
}

#[tokio::test]
async fn test_independent_executions_run_side_by_side() {
    let h = Harness::new(ScriptedInvoker::new().with("slow", Behavior::Succeed(ms(30))));

    let first = h
        .engine
        .start(pipeline("one", &[(false, &["slow"])]), StartOptions::default())
        .await
        .unwrap();
    let second = h
        .engine
        .start(pipeline("two", &[(false, &["slow"])]), StartOptions::default())
        .await
        .unwrap();
    assert_ne!(first, second);

    let (a, b) = tokio::join!(h.engine.wait(first), h.engine.wait(second));
    assert_eq!(a.unwrap().status, ExecutionStatus::Completed);
    assert_eq!(b.unwrap().status, ExecutionStatus::Completed);
    assert_eq!(h.engine.list_executions(None, 10).await.unwrap().len(), 2);
}
