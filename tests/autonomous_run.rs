// tests/autonomous_run.rs

mod common;
use crate::common::{HarnessBuilder, init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use yolo::engine::{LogEntry, ProgressSnapshot, RunRequest};
use yolo::types::{ConceptId, RunId, RunStatus, TaskId, TaskStatus};
use yolo_test_utils::{
    ExecEvent, RecordingCallbacks, ScriptedExecutor, SeedBuilder, TableScorer, fast_config,
};

fn assert_conserved(snapshot: &ProgressSnapshot) {
    assert_eq!(
        snapshot.completed + snapshot.failed + snapshot.running + snapshot.ready + snapshot.pending,
        snapshot.total,
        "counts do not add up in {snapshot:?}"
    );
}

fn log_contains(log: &[LogEntry], needle: &str) -> bool {
    log.iter().any(|e| e.message.contains(needle))
}

#[tokio::test]
async fn independent_tasks_all_complete() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .concept("gamma")
        .task("t1", "alpha")
        .task("t2", "beta")
        .task("t3", "gamma")
        .build()
        .await;
    let harness = HarnessBuilder::new(store.clone()).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.considered, 3);
    assert_eq!(callbacks.completion_count(), 1);

    // Two steps per task, each saved.
    assert_eq!(callbacks.messages().len(), 6);
    for id in ["t1", "t2", "t3"] {
        let task = store.task(&TaskId::from(id)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
    for snapshot in callbacks.snapshots() {
        assert_conserved(&snapshot);
    }
}

#[tokio::test]
async fn tasks_sharing_a_concept_never_overlap() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .task("t1", "alpha")
        .task("t2", "alpha")
        .task("t3", "beta")
        .build()
        .await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new().with_delay(Duration::from_millis(20)))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.completed, 3);
    assert_eq!(harness.executor.max_concurrent("alpha"), 1);
    // beta was not held up behind the second alpha task.
    assert!(harness.executor.max_concurrent_total() >= 2);
}

#[tokio::test]
async fn prerequisites_finish_before_dependents_start() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("basics")
        .concept("advanced")
        .prerequisite("basics", "advanced")
        // Listed dependent-first on purpose.
        .task("t1", "advanced")
        .task("t2", "basics")
        .build()
        .await;
    let harness = HarnessBuilder::new(store).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.completed, 2);
    let basics_done = harness.executor.last_finish("basics").unwrap();
    let advanced_start = harness.executor.first_start("advanced").unwrap();
    assert!(basics_done < advanced_start);
}

#[tokio::test]
async fn budget_limits_admission_and_defers_the_rest() {
    init_tracing();

    let mut seed = SeedBuilder::new();
    for i in 0..5 {
        seed = seed.concept(&format!("c{i}")).task(&format!("t{i}"), &format!("c{i}"));
    }
    let store = seed.build().await;
    let harness = HarnessBuilder::new(store)
        .scorer(TableScorer::new(0.1).score("c3", 0.9).score("c4", 0.8))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.execution_budget = 3;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.total, 3);
    assert!(summary.completed <= 3);
    assert_eq!(summary.deferred, 2);
    assert_eq!(summary.considered, 5);
    // Highest-scoring tasks were admitted.
    assert_eq!(harness.executor.attempts("c3"), 1);
    assert_eq!(harness.executor.attempts("c4"), 1);
}

#[tokio::test]
async fn failing_task_is_retried_then_given_up_without_stopping_others() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("broken")
        .concept("fine")
        .task("t1", "broken")
        .task("t2", "fine")
        .build()
        .await;
    let harness = HarnessBuilder::new(store.clone())
        .executor(ScriptedExecutor::new().always_fail("broken"))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.retry_attempts = 2;
    config.circuit_breaker_threshold = 10;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(harness.executor.attempts("broken"), 3);
    assert_eq!(
        store.task(&TaskId::from("t1")).await.unwrap().status,
        TaskStatus::Failed
    );
    assert!(log_contains(&summary.log, "failed permanently after 3 attempt(s)"));
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    init_tracing();

    let store = SeedBuilder::new().concept("flaky").task("t1", "flaky").build().await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new().fail_times("flaky", 1))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 1);
    assert_eq!(harness.executor.attempts("flaky"), 2);
}

#[tokio::test]
async fn every_task_failing_marks_the_run_failed() {
    init_tracing();

    let store = SeedBuilder::new().concept("broken").task("t1", "broken").build().await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new().always_fail("broken"))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.retry_attempts = 0;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.failed, 1);
    assert_eq!(harness.executor.attempts("broken"), 1);
}

#[tokio::test]
async fn empty_pool_reports_an_error_and_never_completes() {
    init_tracing();

    let store = SeedBuilder::new().concept("alpha").build().await;
    let harness = HarnessBuilder::new(store).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let run_id = harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let error = with_timeout(callbacks.wait_for_error()).await;

    assert!(error.contains("No pending tasks"), "unexpected error: {error}");
    assert_eq!(callbacks.completion_count(), 0);

    // The failed run is unregistered.
    with_timeout(async {
        while harness.service.get_run_state(&run_id).await.is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn category_filter_with_no_match_reports_no_concepts() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept_in("alpha", "marketing")
        .task("t1", "alpha")
        .build()
        .await;
    let harness = HarnessBuilder::new(store).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut request = RunRequest::new(fast_config());
    request.category = Some("finance".to_string());
    harness
        .service
        .start_autonomous_run(request, callbacks.clone())
        .await
        .unwrap();
    let error = with_timeout(callbacks.wait_for_error()).await;

    assert!(error.contains("finance"), "unexpected error: {error}");
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    init_tracing();

    let store = SeedBuilder::new().concept("alpha").task("t1", "alpha").build().await;
    let harness = HarnessBuilder::new(store).build();

    let mut config = fast_config();
    config.max_concurrency = 0;
    let result = harness
        .service
        .start_autonomous_run(RunRequest::new(config), Arc::new(RecordingCallbacks::new()))
        .await;

    assert!(result.is_err());
    assert!(harness.service.runs().await.is_empty());
}

#[tokio::test]
async fn cancellation_drains_workers_and_reports_cancelled() {
    init_tracing();

    let mut seed = SeedBuilder::new();
    for i in 0..4 {
        seed = seed.concept(&format!("c{i}")).task(&format!("t{i}"), &format!("c{i}"));
    }
    let store = seed.build().await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new().with_delay(Duration::from_millis(30)))
        .steps(3)
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.max_concurrency = 2;
    let run_id = harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();

    with_timeout(callbacks.wait_for_snapshot(|s| s.running > 0)).await;
    let cancelled_at = harness.executor.events().len();
    assert!(harness.service.cancel_run(&run_id).await);
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.total, 4);
    assert!(summary.completed < 4);
    assert_eq!(summary.completed + summary.failed + summary.pending, summary.total);
    assert_eq!(callbacks.completion_count(), 1);

    // Only work that was already in flight may continue; nothing new starts.
    let events = harness.executor.events();
    let (before, after) = events.split_at(cancelled_at);
    let started_before: Vec<&ConceptId> = before
        .iter()
        .filter_map(|e| match e {
            ExecEvent::Started { concept, .. } => Some(concept),
            ExecEvent::Finished { .. } => None,
        })
        .collect();
    for event in after {
        if let ExecEvent::Started { concept, step } = event {
            assert!(*step > 0, "{concept} started fresh after cancellation");
            assert!(
                started_before.contains(&concept),
                "{concept} was not running when the run was cancelled"
            );
        }
    }

    // A second request is refused.
    assert!(!harness.service.cancel_run(&run_id).await);
    let last = harness.service.get_run_state(&run_id).await.unwrap();
    assert_eq!(last.status, RunStatus::Cancelled);
    assert_eq!(last.running, 0);
}

#[tokio::test]
async fn unknown_runs_are_not_found() {
    init_tracing();

    let store = SeedBuilder::new().build().await;
    let harness = HarnessBuilder::new(store).build();
    let unknown = RunId::from("nope");

    assert!(harness.service.get_run_state(&unknown).await.is_none());
    assert!(!harness.service.cancel_run(&unknown).await);
}

#[tokio::test]
async fn hard_stop_caps_completed_tasks() {
    init_tracing();

    let mut seed = SeedBuilder::new();
    for i in 0..5 {
        seed = seed.concept(&format!("c{i}")).task(&format!("t{i}"), &format!("c{i}"));
    }
    let store = seed.build().await;
    let harness = HarnessBuilder::new(store).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.max_concepts_hard_stop = 2;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::HardStopped);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.pending, 3);
}

#[tokio::test]
async fn consecutive_failures_trip_the_circuit_breaker() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("bad1")
        .concept("bad2")
        .concept("good")
        .task("t1", "bad1")
        .task("t2", "bad2")
        .task("t3", "good")
        .build()
        .await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new().always_fail("bad1").always_fail("bad2"))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.max_concurrency = 1;
    config.retry_attempts = 0;
    config.circuit_breaker_threshold = 2;
    config.circuit_breaker_cooldown_ms = 20;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.completed, 1);
    assert!(log_contains(&summary.log, "circuit breaker tripped"));
    assert!(log_contains(&summary.log, "circuit breaker reset"));
}

#[tokio::test]
async fn outputs_go_to_the_most_specific_conversation() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .task("t1", "alpha")
        .task("t2", "beta")
        .build()
        .await;
    let harness = HarnessBuilder::new(store).steps(1).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut request = RunRequest::new(fast_config());
    request.root_conversation_id = Some("root".to_string());
    request
        .concept_conversations
        .insert("alpha".into(), "alpha-thread".to_string());
    harness
        .service
        .start_autonomous_run(request, callbacks.clone())
        .await
        .unwrap();
    with_timeout(callbacks.wait_for_summary()).await;

    let messages = callbacks.messages();
    let conversation_of = |concept: &str| {
        messages
            .iter()
            .find(|m| m.concept_id.as_ref().map(|c| c.as_str()) == Some(concept))
            .and_then(|m| m.conversation_id.clone())
    };
    assert_eq!(conversation_of("alpha").as_deref(), Some("alpha-thread"));
    assert_eq!(conversation_of("beta").as_deref(), Some("root"));
}
