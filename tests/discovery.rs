// tests/discovery.rs

mod common;
use crate::common::{HarnessBuilder, init_tracing, with_timeout};

use std::sync::Arc;

use yolo::engine::RunRequest;
use yolo::store::Relationship;
use yolo::types::{ConceptId, RelationshipKind, RunStatus, TaskStatus};
use yolo_test_utils::{
    FlakyStore, RecordingCallbacks, ScriptedExecutor, SeedBuilder, TableScorer,
    TableSemanticSearch, fast_config,
};

#[tokio::test]
async fn related_neighbour_is_discovered_and_run() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .related("alpha", "beta")
        .task("t1", "alpha")
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
    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.considered, 2);
    assert_eq!(callbacks.discovered(), vec![ConceptId::from("beta")]);

    let created: Vec<_> = store
        .all_tasks()
        .await
        .into_iter()
        .filter(|t| t.concept_id.as_str() == "beta")
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].status, TaskStatus::Completed);
}

#[tokio::test]
async fn a_concept_reached_twice_is_admitted_once() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("gamma")
        .concept("beta")
        .related("alpha", "beta")
        .related("gamma", "beta")
        .task("t1", "alpha")
        .task("t2", "gamma")
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

    assert_eq!(summary.total, 3);
    assert_eq!(summary.discovered, 1);
    assert_eq!(harness.executor.attempts("beta"), 1);
}

#[tokio::test]
async fn candidates_below_the_relevance_threshold_are_skipped() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .related("alpha", "beta")
        .task("t1", "alpha")
        .build()
        .await;
    let harness = HarnessBuilder::new(store)
        .scorer(TableScorer::new(0.9).score("beta", 0.1).threshold(0.5))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.considered, 2);
    assert!(callbacks.discovered().is_empty());
    assert!(summary.log.iter().any(|e| e.message.starts_with("skipped beta")));
}

#[tokio::test]
async fn semantic_match_is_admitted_and_linked() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("delta")
        .task("t1", "alpha")
        .build()
        .await;
    let harness = HarnessBuilder::new(store.clone())
        .semantic(TableSemanticSearch::new().on("alpha", "delta", 0.9))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.completed, 2);

    let link = Relationship {
        source: "alpha".into(),
        target: "delta".into(),
        kind: RelationshipKind::Related,
    };
    with_timeout(async {
        while !store.all_relationships().await.contains(&link) {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn weak_semantic_matches_are_ignored() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("delta")
        .task("t1", "alpha")
        .build()
        .await;
    let harness = HarnessBuilder::new(store)
        .semantic(TableSemanticSearch::new().on("alpha", "delta", 0.4))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    harness
        .service
        .start_autonomous_run(RunRequest::new(fast_config()), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.considered, 1);
}

#[tokio::test]
async fn discoveries_over_the_budget_are_deferred() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .related("alpha", "beta")
        .task("t1", "alpha")
        .build()
        .await;
    let harness = HarnessBuilder::new(store).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.execution_budget = 1;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.deferred, 1);
    // Still announced so the caller can pick it up later.
    assert_eq!(callbacks.discovered(), vec![ConceptId::from("beta")]);
    assert_eq!(harness.executor.attempts("beta"), 0);
}

#[tokio::test]
async fn failed_task_creation_lets_a_later_discovery_retry() {
    init_tracing();

    let seeded = SeedBuilder::new()
        .concept("alpha")
        .concept("gamma")
        .concept("beta")
        .related("alpha", "beta")
        .related("gamma", "beta")
        .task("t1", "alpha")
        .task("t2", "gamma")
        .build()
        .await;
    let store = Arc::new(FlakyStore::new(seeded).fail_create_task("beta", 1));
    let harness = HarnessBuilder::new(store.clone()).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.max_concurrency = 1;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.completed, 3);
    assert!(
        summary
            .log
            .iter()
            .any(|e| e.message.starts_with("could not admit discovered concept beta"))
    );
    let beta_tasks = store
        .inner()
        .all_tasks()
        .await
        .into_iter()
        .filter(|t| t.concept_id.as_str() == "beta")
        .count();
    assert_eq!(beta_tasks, 1);
}

#[tokio::test]
async fn discovered_concepts_get_their_own_conversation() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .related("alpha", "beta")
        .task("t1", "alpha")
        .build()
        .await;
    let harness = HarnessBuilder::new(store).steps(1).build();
    let callbacks = Arc::new(RecordingCallbacks::new().with_conversation("beta", "beta-thread"));

    let mut request = RunRequest::new(fast_config());
    request.root_conversation_id = Some("root".to_string());
    harness
        .service
        .start_autonomous_run(request, callbacks.clone())
        .await
        .unwrap();
    with_timeout(callbacks.wait_for_summary()).await;

    let beta = callbacks
        .messages()
        .into_iter()
        .find(|m| m.concept_id == Some(ConceptId::from("beta")))
        .unwrap();
    assert_eq!(beta.conversation_id.as_deref(), Some("beta-thread"));
}

#[tokio::test]
async fn scorer_outage_keeps_the_original_order() {
    init_tracing();

    let mut seed = SeedBuilder::new();
    for i in 0..3 {
        seed = seed.concept(&format!("c{i}")).task(&format!("t{i}"), &format!("c{i}"));
    }
    let store = seed.build().await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new())
        .scorer(TableScorer::new(0.9).failing())
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.execution_budget = 2;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.deferred, 1);
    assert_eq!(harness.executor.attempts("c0"), 1);
    assert_eq!(harness.executor.attempts("c1"), 1);
    assert_eq!(harness.executor.attempts("c2"), 0);
}

#[tokio::test]
async fn discovered_task_waits_for_an_unfinished_prerequisite() {
    init_tracing();

    // beta needs both alpha and gamma; gamma fails once and backs off while
    // alpha's completion brings beta into the run.
    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("gamma")
        .concept("beta")
        .prerequisite("alpha", "beta")
        .prerequisite("gamma", "beta")
        .task("t1", "alpha")
        .task("t2", "gamma")
        .build()
        .await;
    let harness = HarnessBuilder::new(store)
        .executor(ScriptedExecutor::new().fail_times("gamma", 1))
        .build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.retry_base_delay_ms = 100;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.discovered, 1);
    assert_eq!(harness.executor.attempts("gamma"), 2);

    let beta_start = harness.executor.first_start("beta").unwrap();
    let gamma_done = harness.executor.last_finish("gamma").unwrap();
    assert!(
        beta_start > gamma_done,
        "beta started at event {beta_start}, gamma finished at {gamma_done}"
    );
}

#[tokio::test]
async fn discovered_prerequisite_holds_back_a_queued_task() {
    init_tracing();

    // delta is queued with nothing to wait on until beta, its prerequisite,
    // is discovered from alpha.
    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("beta")
        .concept("delta")
        .related("alpha", "beta")
        .prerequisite("beta", "delta")
        .task("t1", "alpha")
        .task("t2", "delta")
        .build()
        .await;
    let harness = HarnessBuilder::new(store).build();
    let callbacks = Arc::new(RecordingCallbacks::new());

    let mut config = fast_config();
    config.max_concurrency = 1;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.discovered, 1);
    assert!(summary.log.iter().any(|e| e.message == "delta now waits on beta"));

    let alpha_done = harness.executor.last_finish("alpha").unwrap();
    let beta_start = harness.executor.first_start("beta").unwrap();
    let beta_done = harness.executor.last_finish("beta").unwrap();
    let delta_start = harness.executor.first_start("delta").unwrap();
    assert!(alpha_done < beta_start);
    assert!(beta_done < delta_start);
}

#[tokio::test]
async fn failed_conversation_leaves_no_stray_task_record() {
    init_tracing();

    let store = SeedBuilder::new()
        .concept("alpha")
        .concept("gamma")
        .concept("beta")
        .related("alpha", "beta")
        .related("gamma", "beta")
        .task("t1", "alpha")
        .task("t2", "gamma")
        .build()
        .await;
    let harness = HarnessBuilder::new(store.clone()).build();
    let callbacks = Arc::new(RecordingCallbacks::new().fail_conversation("beta", 1));

    let mut config = fast_config();
    config.max_concurrency = 1;
    harness
        .service
        .start_autonomous_run(RunRequest::new(config), callbacks.clone())
        .await
        .unwrap();
    let summary = with_timeout(callbacks.wait_for_summary()).await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.completed, 3);
    assert!(
        summary
            .log
            .iter()
            .any(|e| e.message.starts_with("could not admit discovered concept beta"))
    );
    let beta_tasks: Vec<_> = store
        .all_tasks()
        .await
        .into_iter()
        .filter(|t| t.concept_id.as_str() == "beta")
        .collect();
    assert_eq!(beta_tasks.len(), 1);
    assert_eq!(beta_tasks[0].status, TaskStatus::Completed);
}
