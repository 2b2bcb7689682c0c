//! Run-log files as observed after real request lifecycles

mod common;

use std::sync::Arc;

use common::{DriverCounters, FakeEngine, grid, simple_spec, test_config};
use futures::future::join_all;
use kodegen_tools_testgrid::run_log::RunLogStore;
use tempfile::TempDir;

async fn read_run_log(root: &std::path::Path, id: &str) -> String {
    tokio::fs::read_to_string(root.join(id).join("run.log"))
        .await
        .unwrap_or_else(|e| panic!("run log for {id} should exist: {e}"))
}

#[tokio::test]
async fn completed_run_leaves_a_full_lifecycle_trace() {
    let dir = TempDir::new().expect("temp dir");
    let counters = Arc::new(DriverCounters::default());
    let handler = grid(
        test_config(dir.path()),
        Arc::clone(&counters),
        FakeEngine::instant(),
    );

    let run = handler.test_run(simple_spec());
    let id = run.id().to_string();
    handler.process(run).await.expect("run should complete");
    handler.shutdown().await;

    let content = read_run_log(dir.path(), &id).await;
    for needle in [
        "[received] admitted",
        "[validating]",
        "[queued]",
        "[processing]",
        "step 1: navigate to https://example.test/login",
        "[completed]",
    ] {
        assert!(content.contains(needle), "missing {needle:?} in:\n{content}");
    }
    assert!(content.trim_end().ends_with("final state: completed"));

    // Lines land in lifecycle order.
    let admitted = content.find("admitted").expect("admitted line");
    let step = content.find("step 1").expect("step line");
    let completed = content.find("[completed]").expect("completed line");
    assert!(admitted < step && step < completed);
}

#[tokio::test]
async fn rejected_request_still_gets_its_log_flushed() {
    let dir = TempDir::new().expect("temp dir");
    let counters = Arc::new(DriverCounters::default());
    let handler = grid(
        test_config(dir.path()),
        Arc::clone(&counters),
        FakeEngine::instant(),
    );
    handler.shutdown().await;

    let run = handler.test_run(simple_spec());
    let id = run.id().to_string();
    let result = handler.process(run).await;
    assert!(result.is_err());

    let content = read_run_log(dir.path(), &id).await;
    assert!(content.contains("[rejected]"), "got:\n{content}");
    assert!(content.contains("shutting down"));
    assert!(content.trim_end().ends_with("final state: rejected"));
}

#[tokio::test]
async fn failed_run_records_the_failure_reason() {
    let dir = TempDir::new().expect("temp dir");
    let counters = Arc::new(DriverCounters::default());
    let handler = grid(
        test_config(dir.path()),
        Arc::clone(&counters),
        FakeEngine::instant(),
    );

    let mut spec = simple_spec();
    spec.steps.clear();
    let run = handler.test_run(spec);
    let id = run.id().to_string();
    let _ = handler.process(run).await;
    handler.shutdown().await;

    let content = read_run_log(dir.path(), &id).await;
    assert!(content.contains("[failure]"));
    assert!(content.contains("no steps"));
    assert!(content.trim_end().ends_with("final state: failure"));
}

#[tokio::test]
async fn concurrent_appends_all_survive_flush_all() {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(RunLogStore::new(dir.path().to_path_buf(), 1024 * 1024));
    let handle = store.create("busy-run");

    let writers = (0..8).map(|w| {
        let handle = handle.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                handle.append(&format!("writer {w} line {i}"));
                tokio::task::yield_now().await;
            }
        })
    });
    for joined in join_all(writers).await {
        joined.expect("writer task should not panic");
    }
    store.flush_all().await;

    let content = read_run_log(dir.path(), "busy-run").await;
    assert_eq!(content.lines().count(), 8 * 50);
    for w in 0..8 {
        assert!(content.contains(&format!("writer {w} line 49")));
    }
    // flush_all leaves the sink registered for future appends.
    assert_eq!(store.sink_count(), 1);

    handle.append("after the flush");
    store
        .flush_and_remove("busy-run", "final state: completed")
        .await
        .expect("retiring the sink should succeed");
    let content = read_run_log(dir.path(), "busy-run").await;
    assert!(content.contains("after the flush"));
    assert!(content.trim_end().ends_with("final state: completed"));
    assert_eq!(store.sink_count(), 0);

    // Post-retirement writes go through the marked out-of-band path.
    store
        .late_flush("busy-run", "shutdown leftovers")
        .await
        .expect("late flush should succeed");
    let content = read_run_log(dir.path(), "busy-run").await;
    assert!(content.contains("[late] shutdown leftovers"));
}
