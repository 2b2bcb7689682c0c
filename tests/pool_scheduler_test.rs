//! Concurrency properties of the generic keyed pool

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use kodegen_tools_testgrid::pool::{KeyedPool, PoolError, PoolResource, ResourceFactory};

/// Factory whose resources track liveness so capacity can be asserted
struct TrackingFactory {
    creations: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    delay: Duration,
}

impl TrackingFactory {
    fn new(delay: Duration) -> Self {
        Self {
            creations: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            delay,
        }
    }
}

struct TrackedResource {
    closed: AtomicBool,
    live: Arc<AtomicUsize>,
}

impl TrackedResource {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PoolResource for TrackedResource {
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.closed.store(true, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
        async { Ok(()) }
    }
}

impl ResourceFactory for TrackingFactory {
    type Key = String;
    type Resource = TrackedResource;

    fn create(
        &self,
        key: &Self::Key,
    ) -> impl Future<Output = anyhow::Result<Self::Resource>> + Send {
        self.creations.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail.load(Ordering::SeqCst);
        let live = Arc::clone(&self.live);
        let max_live = Arc::clone(&self.max_live);
        let delay = self.delay;
        let key = key.clone();
        async move {
            tokio::time::sleep(delay).await;
            if fail {
                anyhow::bail!("injected creation failure for {key}");
            }
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            max_live.fetch_max(now, Ordering::SeqCst);
            Ok(TrackedResource {
                closed: AtomicBool::new(false),
                live,
            })
        }
    }
}

#[tokio::test]
async fn hundred_concurrent_demands_cause_exactly_one_creation() {
    common::init_logging();
    let factory = TrackingFactory::new(Duration::from_millis(20));
    let creations = Arc::clone(&factory.creations);
    let pool = KeyedPool::new("test", 1, factory);

    let acquires = (0..100).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire("chrome-120".to_string()).await })
    });
    let guards: Vec<_> = join_all(acquires)
        .await
        .into_iter()
        .map(|joined| {
            joined
                .expect("acquire task should not panic")
                .expect("every demand should be served")
        })
        .collect();

    assert_eq!(guards.len(), 100);
    assert_eq!(creations.load(Ordering::SeqCst), 1);
    for guard in &guards {
        assert!(!guard.resource().is_closed());
    }
    for guard in guards {
        guard.release().await;
    }
    assert_eq!(pool.live_count(), 0);
}

#[tokio::test]
async fn live_count_never_exceeds_capacity() {
    common::init_logging();
    let factory = TrackingFactory::new(Duration::from_millis(5));
    let max_live = Arc::clone(&factory.max_live);
    let pool = KeyedPool::new("test", 3, factory);

    let tasks = (0..24).map(|i| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let guard = pool
                .acquire(format!("key-{i}"))
                .await
                .expect("demand should be served");
            tokio::time::sleep(Duration::from_millis(10)).await;
            guard.release().await;
        })
    });
    for joined in join_all(tasks).await {
        joined.expect("pool task should not panic");
    }

    assert!(max_live.load(Ordering::SeqCst) <= 3);
    assert_eq!(pool.live_count(), 0);
}

#[tokio::test]
async fn racing_demand_never_observes_a_closed_resource() {
    common::init_logging();
    let factory = TrackingFactory::new(Duration::from_millis(1));
    let pool = KeyedPool::new("test", 1, factory);

    for _ in 0..50 {
        let held = pool
            .acquire("chrome-120".to_string())
            .await
            .expect("initial demand should be served");
        let racing = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("chrome-120".to_string()).await })
        };
        held.release().await;
        let guard = racing
            .await
            .expect("racing task should not panic")
            .expect("racing demand should be served");
        assert!(
            !guard.resource().is_closed(),
            "a served demand observed a closed handle"
        );
        guard.release().await;
    }
}

#[tokio::test]
async fn creation_failure_fails_every_queued_demand() {
    common::init_logging();
    let factory = TrackingFactory::new(Duration::from_millis(20));
    let creations = Arc::clone(&factory.creations);
    let fail = Arc::clone(&factory.fail);
    fail.store(true, Ordering::SeqCst);
    let pool = KeyedPool::new("test", 1, factory);

    let demands = (0..10).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire("chrome-120".to_string()).await })
    });
    for joined in join_all(demands).await {
        let result = joined.expect("demand task should not panic");
        assert!(matches!(result, Err(PoolError::CreationFailed { .. })));
    }
    assert_eq!(pool.live_count(), 0);

    // A fresh demand after the failure gets a brand-new attempt.
    fail.store(false, Ordering::SeqCst);
    let before = creations.load(Ordering::SeqCst);
    let guard = pool
        .acquire("chrome-120".to_string())
        .await
        .expect("fresh demand should trigger a new creation");
    assert_eq!(creations.load(Ordering::SeqCst), before + 1);
    guard.release().await;
}

#[tokio::test]
async fn shutdown_fails_demands_parked_behind_a_creation() {
    common::init_logging();
    let factory = TrackingFactory::new(Duration::from_millis(100));
    let pool = KeyedPool::new("test", 1, factory);

    let parked = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire("chrome-120".to_string()).await })
    };
    // Let the demand queue behind the in-flight creation before the sweep.
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), parked)
        .await
        .expect("a parked demand must resolve during shutdown, not hang")
        .expect("demand task should not panic");
    assert!(matches!(result, Err(PoolError::ShuttingDown)));

    // The creation still finishes; its unclaimed resource is retired.
    common::wait_until(
        "the orphaned resource to retire",
        Duration::from_secs(5),
        || pool.live_count() == 0,
    )
    .await;
}

#[tokio::test]
async fn demands_racing_shutdown_never_strand() {
    common::init_logging();
    for _ in 0..50 {
        let factory = TrackingFactory::new(Duration::from_millis(2));
        let pool = KeyedPool::new("test", 2, factory);

        let demands: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire(format!("key-{}", i % 3)).await })
            })
            .collect();
        let closer = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown().await })
        };

        // Every demand resolves with a guard or an error; none hangs.
        for task in demands {
            let result = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("a demand racing shutdown must resolve, not hang")
                .expect("demand task should not panic");
            if let Ok(guard) = result {
                guard.release().await;
            }
        }
        closer.await.expect("shutdown task should not panic");
        common::wait_until(
            "all resources to retire",
            Duration::from_secs(5),
            || pool.live_count() == 0,
        )
        .await;
    }
}

#[tokio::test]
async fn distinct_keys_get_distinct_resources_up_to_capacity() {
    common::init_logging();
    let factory = TrackingFactory::new(Duration::from_millis(5));
    let creations = Arc::clone(&factory.creations);
    let pool = KeyedPool::new("test", 2, factory);

    let a = pool
        .acquire("chrome-120".to_string())
        .await
        .expect("first key should be served");
    let b = pool
        .acquire("chrome-121".to_string())
        .await
        .expect("second key should be served");
    assert_eq!(creations.load(Ordering::SeqCst), 2);
    assert_eq!(pool.live_count(), 2);
    a.release().await;
    b.release().await;
}
