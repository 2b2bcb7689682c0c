//! Generic keyed resource pool
//!
//! One scheduling component reused at every level of the browser hierarchy:
//! a capacity semaphore bounds concurrent live resources, demand for a cold
//! key queues behind a single creation task, and teardown re-checks
//! "safe to close" under the key's lock so a racing demand keeps the
//! resource alive instead of observing a closed handle.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, oneshot};

use super::error::PoolError;

/// Identity a pool level is keyed by
///
/// Blanket-implemented; `Display` feeds log lines.
pub trait PoolKey: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static> PoolKey for T {}

/// A pooled native resource
pub trait PoolResource: Send + Sync + 'static {
    /// Close the underlying native resource
    fn close(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Creates resources on demand for a pool level
pub trait ResourceFactory: Send + Sync + 'static {
    type Key: PoolKey;
    type Resource: PoolResource;

    /// Create the resource for `key`
    ///
    /// Runs outside any pool lock; a failure fails every demand queued for
    /// the key at that moment.
    fn create(
        &self,
        key: &Self::Key,
    ) -> impl Future<Output = anyhow::Result<Self::Resource>> + Send;
}

/// A live resource together with its scheduling bookkeeping
///
/// The capacity permit lives inside the slot and is dropped exactly once
/// when the slot is retired.
#[derive(Debug)]
struct LiveSlot<R> {
    resource: R,
    permit: parking_lot::Mutex<Option<OwnedSemaphorePermit>>,
    closed: AtomicBool,
    active: AtomicUsize,
}

impl<R> LiveSlot<R> {
    fn new(resource: R, permit: OwnedSemaphorePermit) -> Self {
        Self {
            resource,
            permit: parking_lot::Mutex::new(Some(permit)),
            closed: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

type DemandWaiter<F> =
    oneshot::Sender<Result<PoolGuard<F>, PoolError>>;

/// Per-key scheduling state, guarded by the key's async mutex
struct KeyEntry<F: ResourceFactory> {
    live: Option<Arc<LiveSlot<F::Resource>>>,
    pending: VecDeque<DemandWaiter<F>>,
    creation_queued: bool,
    /// Set when the entry is removed from the key map; a waiter that locked
    /// a stale entry retries against a fresh one
    detached: bool,
}

impl<F: ResourceFactory> Default for KeyEntry<F> {
    fn default() -> Self {
        Self {
            live: None,
            pending: VecDeque::new(),
            creation_queued: false,
            detached: false,
        }
    }
}

struct PoolCore<F: ResourceFactory> {
    name: &'static str,
    factory: F,
    capacity: usize,
    permits: Arc<Semaphore>,
    entries: DashMap<F::Key, Arc<Mutex<KeyEntry<F>>>>,
    creation_queue: parking_lot::Mutex<VecDeque<F::Key>>,
    shutdown: AtomicBool,
    created_total: AtomicUsize,
    closed_total: AtomicUsize,
}

impl<F: ResourceFactory> PoolCore<F> {
    fn entry(&self, key: &F::Key) -> Arc<Mutex<KeyEntry<F>>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(KeyEntry::default())))
            .clone()
    }

    /// Drain step: move one queued creation into flight if a permit is free
    fn try_advance(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let queued = self.creation_queue.lock().len();
                if queued > 0 {
                    log::debug!(
                        "{}: at capacity, {queued} creation task(s) queued",
                        self.name
                    );
                }
                return;
            }
        };
        let Some(key) = self.creation_queue.lock().pop_front() else {
            drop(permit);
            return;
        };
        let pool = Arc::clone(self);
        tokio::spawn(pool.run_creation(key, permit));
    }

    /// Execute one creation task and hand the result to every queued demand
    async fn run_creation(self: Arc<Self>, key: F::Key, permit: OwnedSemaphorePermit) {
        log::info!("{}: creating resource for key {key}", self.name);
        self.created_total.fetch_add(1, Ordering::SeqCst);
        let created = self.factory.create(&key).await;

        let entry = self.entry(&key);
        let mut state = entry.lock().await;
        state.creation_queued = false;
        match created {
            Ok(resource) => {
                let slot = Arc::new(LiveSlot::new(resource, permit));
                let mut served = 0usize;
                while let Some(waiter) = state.pending.pop_front() {
                    let guard =
                        PoolGuard::new(Arc::clone(&slot), Arc::clone(&self), key.clone());
                    // A failed send means the demand vanished while queued;
                    // the returned guard drops and undoes its own claim.
                    if waiter.send(Ok(guard)).is_ok() {
                        served += 1;
                    }
                }
                let active_now = slot.active.load(Ordering::SeqCst);
                state.live = Some(slot);
                drop(state);
                log::info!(
                    "{}: resource for key {key} is live, handed to {served} waiter(s)",
                    self.name
                );
                if active_now == 0 {
                    // Every waiter vanished before the resource came up.
                    self.maybe_retire(&key).await;
                }
                self.try_advance();
            }
            Err(e) => {
                log::warn!("{}: creation for key {key} failed: {e:#}", self.name);
                let message = format!("{e:#}");
                while let Some(waiter) = state.pending.pop_front() {
                    let _ = waiter.send(Err(PoolError::CreationFailed {
                        key: key.to_string(),
                        message: message.clone(),
                    }));
                }
                state.detached = true;
                self.entries.remove(&key);
                drop(state);
                // The slot never went live; free its capacity here.
                drop(permit);
                self.try_advance();
            }
        }
    }

    /// Teardown step: close the key's resource if no demand remains
    ///
    /// The safe-to-close predicate is re-evaluated under the key lock, so a
    /// demand that raced in after the caller decided to close wins and the
    /// resource stays alive.
    async fn maybe_retire(self: &Arc<Self>, key: &F::Key) {
        let Some(entry) = self.entries.get(key).map(|e| Arc::clone(e.value())) else {
            return;
        };
        let mut state = entry.lock().await;
        if state.detached {
            return;
        }
        let Some(slot) = state.live.clone() else {
            if state.pending.is_empty() && !state.creation_queued {
                state.detached = true;
                self.entries.remove(key);
            }
            return;
        };
        if slot.active.load(Ordering::SeqCst) > 0 || !state.pending.is_empty() {
            log::debug!(
                "{}: keeping resource for key {key}, demand arrived before close",
                self.name
            );
            return;
        }
        state.live = None;
        slot.closed.store(true, Ordering::SeqCst);
        log::info!("{}: closing resource for key {key}", self.name);
        if let Err(e) = slot.resource.close().await {
            log::warn!(
                "{}: close for key {key} failed, native handle may leak: {e:#}",
                self.name
            );
        }
        // Exactly-once permit release, even if stale slot references linger.
        let permit = slot.permit.lock().take();
        drop(permit);
        state.detached = true;
        self.entries.remove(key);
        drop(state);
        self.closed_total.fetch_add(1, Ordering::SeqCst);
        self.try_advance();
    }
}

/// RAII claim on a live pooled resource
///
/// Holding a guard keeps the resource's active count positive, which blocks
/// teardown. Prefer [`release`](PoolGuard::release) on deliberate paths; a
/// plain drop schedules the teardown check in the background.
pub struct PoolGuard<F: ResourceFactory> {
    slot: Arc<LiveSlot<F::Resource>>,
    pool: Arc<PoolCore<F>>,
    key: F::Key,
    released: bool,
}

impl<F: ResourceFactory> PoolGuard<F> {
    fn new(slot: Arc<LiveSlot<F::Resource>>, pool: Arc<PoolCore<F>>, key: F::Key) -> Self {
        slot.active.fetch_add(1, Ordering::SeqCst);
        Self {
            slot,
            pool,
            key,
            released: false,
        }
    }

    /// The live resource
    #[must_use]
    pub fn resource(&self) -> &F::Resource {
        &self.slot.resource
    }

    /// Pool key this guard was served under
    #[must_use]
    pub fn key(&self) -> &F::Key {
        &self.key
    }

    /// Give the claim back and run the teardown check inline
    pub async fn release(mut self) {
        self.released = true;
        let pool = Arc::clone(&self.pool);
        let key = self.key.clone();
        self.slot.active.fetch_sub(1, Ordering::SeqCst);
        drop(self);
        pool.maybe_retire(&key).await;
    }
}

impl<F: ResourceFactory> Drop for PoolGuard<F> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.slot.active.fetch_sub(1, Ordering::SeqCst);
        let pool = Arc::clone(&self.pool);
        let key = self.key.clone();
        tokio::spawn(async move {
            pool.maybe_retire(&key).await;
        });
    }
}

/// Capacity-limited pool of keyed resources
///
/// Demand for a key attaches to its live resource when one exists; otherwise
/// it queues behind a single creation task for that key. Creation tasks from
/// different keys compete for capacity permits in FIFO order.
pub struct KeyedPool<F: ResourceFactory> {
    core: Arc<PoolCore<F>>,
}

impl<F: ResourceFactory> Clone for KeyedPool<F> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<F: ResourceFactory> KeyedPool<F> {
    /// Create a pool
    ///
    /// # Arguments
    /// * `name` - Short label used in log lines (e.g. "browser")
    /// * `capacity` - Maximum concurrent live resources
    /// * `factory` - Creates resources for cold keys
    #[must_use]
    pub fn new(name: &'static str, capacity: usize, factory: F) -> Self {
        Self {
            core: Arc::new(PoolCore {
                name,
                factory,
                capacity,
                permits: Arc::new(Semaphore::new(capacity)),
                entries: DashMap::new(),
                creation_queue: parking_lot::Mutex::new(VecDeque::new()),
                shutdown: AtomicBool::new(false),
                created_total: AtomicUsize::new(0),
                closed_total: AtomicUsize::new(0),
            }),
        }
    }

    /// Claim the resource for `key`, waiting for creation if necessary
    ///
    /// Suspends while the key is cold and capacity is busy. There is no
    /// queue timeout; external cancellation (dropping the future) is the
    /// only way out of a long wait.
    pub async fn acquire(&self, key: F::Key) -> Result<PoolGuard<F>, PoolError> {
        if self.core.shutdown.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }
        let rx = loop {
            let entry = self.core.entry(&key);
            let mut state = entry.lock().await;
            if state.detached {
                // Lost a race with entry removal; fetch a fresh entry.
                continue;
            }
            // Re-checked under the key lock: a waiter that passes here with
            // the flag clear has its entry visible to the shutdown sweep, so
            // it is either served or failed, never stranded.
            if self.core.shutdown.load(Ordering::SeqCst) {
                return Err(PoolError::ShuttingDown);
            }
            if let Some(slot) = state.live.as_ref() {
                if !slot.is_closed() {
                    log::debug!("{}: attaching demand to live key {key}", self.core.name);
                    return Ok(PoolGuard::new(
                        Arc::clone(slot),
                        Arc::clone(&self.core),
                        key.clone(),
                    ));
                }
            }
            let (tx, rx) = oneshot::channel();
            state.pending.push_back(tx);
            let first_for_key = !state.creation_queued;
            if first_for_key {
                state.creation_queued = true;
                self.core.creation_queue.lock().push_back(key.clone());
            }
            drop(state);
            if first_for_key {
                self.core.try_advance();
            }
            break rx;
        };
        match rx.await {
            Ok(result) => result,
            Err(_) => {
                if self.core.shutdown.load(Ordering::SeqCst) {
                    Err(PoolError::ShuttingDown)
                } else {
                    Err(PoolError::Abandoned)
                }
            }
        }
    }

    /// Stop admitting demand, fail queued creations, close idle resources
    ///
    /// The sweep visits every key entry, not just the keys still in the
    /// creation queue: a waiter pushed concurrently with the flag flip sits
    /// in an entry's pending list before its key reaches the queue, and it
    /// must be failed rather than stranded. Live resources still claimed by
    /// guards are closed later by their final release.
    pub async fn shutdown(&self) {
        if self.core.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("{}: shutting down", self.core.name);
        self.core.creation_queue.lock().clear();
        let entries: Vec<(F::Key, Arc<Mutex<KeyEntry<F>>>)> = self
            .core
            .entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (key, entry) in entries {
            {
                let mut state = entry.lock().await;
                state.creation_queued = false;
                while let Some(waiter) = state.pending.pop_front() {
                    let _ = waiter.send(Err(PoolError::ShuttingDown));
                }
            }
            self.core.maybe_retire(&key).await;
        }
    }

    /// Number of live resources right now
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.core.capacity - self.core.permits.available_permits()
    }

    /// Number of creation tasks waiting for capacity
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.core.creation_queue.lock().len()
    }

    /// Total creations attempted since the pool was built
    #[must_use]
    pub fn created_total(&self) -> usize {
        self.core.created_total.load(Ordering::SeqCst)
    }

    /// Total resources closed since the pool was built
    #[must_use]
    pub fn closed_total(&self) -> usize {
        self.core.closed_total.load(Ordering::SeqCst)
    }

    /// Configured capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.capacity
    }
}
