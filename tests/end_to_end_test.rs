//! Whole-grid behavior with the fake driver: sharing, capacity and teardown

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{DriverCounters, FakeEngine, grid, simple_spec, test_config};
use futures::future::join_all;
use kodegen_tools_testgrid::driver::{BrowserKey, BrowserKind};
use kodegen_tools_testgrid::{GridConfig, TestRunSpec, TestStep};
use tempfile::TempDir;

fn spec_for(key: BrowserKey) -> TestRunSpec {
    TestRunSpec {
        browser: key,
        steps: vec![TestStep::Navigate {
            url: "https://example.test/dashboard".to_string(),
        }],
    }
}

#[tokio::test]
async fn overlapping_runs_on_one_key_share_a_single_browser() {
    let dir = TempDir::new().expect("temp dir");
    let config = GridConfig::builder()
        .log_root(dir.path())
        .browser_capacity(1)
        .step_pacing_ms(0)
        .build()
        .expect("config should validate");
    let counters = Arc::new(DriverCounters::default());
    // Slow enough that the second run attaches while the first still holds
    // the browser; the launch itself takes 20ms.
    let handler = grid(
        config,
        Arc::clone(&counters),
        FakeEngine::slow(Duration::from_millis(250)),
    );

    let tasks = (0..2).map(|_| {
        let run = handler.test_run(simple_spec());
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { handler.process(run).await })
    });
    for joined in join_all(tasks).await {
        joined
            .expect("run task should not panic")
            .expect("both runs should complete");
    }

    assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
    assert_eq!(counters.contexts_opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.pages_opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closed_observations.load(Ordering::SeqCst), 0);

    handler.shutdown().await;
    assert_eq!(counters.live_browsers.load(Ordering::SeqCst), 0);
    assert_eq!(handler.browser_pool().live_count(), 0);
}

#[tokio::test]
async fn browser_capacity_bounds_live_processes_across_keys() {
    let dir = TempDir::new().expect("temp dir");
    let config = GridConfig::builder()
        .log_root(dir.path())
        .browser_capacity(2)
        .step_pacing_ms(0)
        .build()
        .expect("config should validate");
    let counters = Arc::new(DriverCounters::default());
    let handler = grid(
        config,
        Arc::clone(&counters),
        FakeEngine::slow(Duration::from_millis(30)),
    );

    let tasks = (0..8).map(|i| {
        let key = BrowserKey::new(BrowserKind::Chrome, format!("{}", 110 + i));
        let run = handler.test_run(spec_for(key));
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { handler.process(run).await })
    });
    for joined in join_all(tasks).await {
        joined
            .expect("run task should not panic")
            .expect("every run should complete");
    }

    assert!(
        counters.max_live_browsers.load(Ordering::SeqCst) <= 2,
        "browser capacity was exceeded"
    );
    assert_eq!(counters.closed_observations.load(Ordering::SeqCst), 0);

    handler.shutdown().await;
    assert_eq!(counters.live_browsers.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn launch_failure_surfaces_as_a_processing_failure() {
    let dir = TempDir::new().expect("temp dir");
    let counters = Arc::new(DriverCounters::default());
    let failing = common::FakeDriver::new(Arc::clone(&counters));
    failing.fail_launches.store(true, Ordering::SeqCst);
    let handler = kodegen_tools_testgrid::RequestHandler::new(
        test_config(dir.path()),
        Arc::new(failing),
        Arc::new(FakeEngine::instant()),
    );

    let result = handler.process(handler.test_run(simple_spec())).await;
    match result {
        Err(kodegen_tools_testgrid::RequestError::Processing(err)) => {
            assert!(err.to_string().contains("launch failure"), "got: {err:#}");
        }
        other => panic!("expected a processing failure, got {other:?}"),
    }
    assert_eq!(counters.live_browsers.load(Ordering::SeqCst), 0);

    handler.shutdown().await;
}

#[tokio::test]
async fn a_mixed_burst_settles_with_nothing_left_behind() {
    let dir = TempDir::new().expect("temp dir");
    let config = GridConfig::builder()
        .log_root(dir.path())
        .browser_capacity(2)
        .step_pacing_ms(0)
        .build()
        .expect("config should validate");
    let counters = Arc::new(DriverCounters::default());
    let handler = grid(
        config,
        Arc::clone(&counters),
        FakeEngine::slow(Duration::from_millis(20)),
    );

    let tasks = (0..12).map(|i| {
        let version = if i % 2 == 0 { "120" } else { "121" };
        let key = BrowserKey::new(BrowserKind::Chrome, version);
        let run = handler.test_run(spec_for(key));
        let handler = Arc::clone(&handler);
        tokio::spawn(async move { handler.process(run).await })
    });
    for joined in join_all(tasks).await {
        joined
            .expect("run task should not panic")
            .expect("every run should complete");
    }

    assert_eq!(counters.closed_observations.load(Ordering::SeqCst), 0);
    assert_eq!(handler.active_count(), 0);
    assert_eq!(handler.log_store().sink_count(), 0);

    handler.shutdown().await;
    assert_eq!(counters.live_browsers.load(Ordering::SeqCst), 0);
    assert_eq!(handler.browser_pool().live_count(), 0);

    // Every run left a retired log folder behind.
    let mut folders = tokio::fs::read_dir(dir.path()).await.expect("log root");
    let mut count = 0;
    while let Some(entry) = folders.next_entry().await.expect("dir entry") {
        if entry.file_type().await.expect("file type").is_dir() {
            count += 1;
        }
    }
    assert_eq!(count, 12);
}
