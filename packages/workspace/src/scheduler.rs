//! # Derived-Data Scheduler
//!
//! Runs dependency resolutions off the interactive thread and caches their
//! results per [`ResolveKey`].
//!
//! - At most one resolution per key is in flight. Every request for a key
//!   that is already being resolved, forced or not, joins that computation.
//! - Only successful results are cached; a failure is handed to the waiters
//!   of that computation and forgotten.
//! - Each requester holds a [`ResolveTicket`]. The computation is cancelled
//!   (cooperatively, through its [`CancelFlag`]) once every ticket
//!   interested in it was cancelled or dropped.
//! - Resolutions run on tokio's blocking pool, bounded by a semaphore.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::dependency::DependencyTree;
use crate::resolver::{CancelFlag, DependencyResolver, ResolutionError, ResolutionResult, ResolveKey};

/// Outcome of one resolution, shared by everyone who waited for it
pub type Resolution = ResolutionResult<Arc<DependencyTree>>;

type SharedResolution = Shared<BoxFuture<'static, Resolution>>;

struct InFlight {
    generation: u64,
    future: SharedResolution,
    cancel: CancelFlag,
    interested: usize,
}

#[derive(Default)]
struct SchedulerState {
    cache: HashMap<ResolveKey, Arc<DependencyTree>>,
    in_flight: HashMap<ResolveKey, InFlight>,
    next_generation: u64,
}

struct Inner {
    handle: Handle,
    resolver: Arc<dyn DependencyResolver>,
    permits: Arc<Semaphore>,
    state: Mutex<SchedulerState>,
    computations: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the result of a computation that is still the current one
    fn finish(&self, key: &ResolveKey, generation: u64, result: &Resolution) {
        let mut state = self.lock();
        if state.in_flight.get(key).map(|f| f.generation) != Some(generation) {
            tracing::debug!(scope = %key.scope, "discarding superseded resolution");
            return;
        }
        state.in_flight.remove(key);
        match result {
            Ok(tree) => {
                state.cache.insert(key.clone(), tree.clone());
            }
            Err(err) => tracing::debug!(scope = %key.scope, error = %err, "resolution failed"),
        }
    }

    /// One requester lost interest
    fn release(&self, key: &ResolveKey, generation: u64) {
        let mut state = self.lock();
        let Some(flight) = state.in_flight.get_mut(key) else {
            return;
        };
        if flight.generation != generation {
            return;
        }
        flight.interested = flight.interested.saturating_sub(1);
        if flight.interested == 0 {
            flight.cancel.cancel();
            state.in_flight.remove(key);
            tracing::debug!(descriptor = %key.descriptor.display(), scope = %key.scope, "resolution cancelled");
        }
    }
}

#[derive(Clone)]
pub struct DerivedDataScheduler {
    inner: Arc<Inner>,
}

impl DerivedDataScheduler {
    /// `workers` bounds how many resolutions run at once (at least one)
    pub fn new(handle: Handle, resolver: impl DependencyResolver, workers: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                resolver: Arc::new(resolver),
                permits: Arc::new(Semaphore::new(workers.max(1))),
                state: Mutex::new(SchedulerState::default()),
                computations: AtomicUsize::new(0),
            }),
        }
    }

    /// Ask for the tree of `key` without waiting for it
    ///
    /// Callable from any thread, runtime context or not.
    pub fn request(&self, key: ResolveKey, force: bool) -> ResolveTicket {
        let mut state = self.inner.lock();

        if !force {
            if let Some(tree) = state.cache.get(&key) {
                tracing::debug!(scope = %key.scope, "resolution cache hit");
                return ResolveTicket::ready(key, Ok(tree.clone()));
            }
        }

        if let Some(flight) = state.in_flight.get_mut(&key) {
            flight.interested += 1;
            tracing::debug!(scope = %key.scope, waiters = flight.interested, "joined running resolution");
            let (generation, future) = (flight.generation, flight.future.clone());
            return ResolveTicket::pending(self.inner.clone(), key, generation, future);
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let cancel = CancelFlag::new();
        // Spawned while locked: the worker cannot finish before the entry exists
        let future = self.spawn(key.clone(), generation, cancel.clone());
        state.in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                future: future.clone(),
                cancel,
                interested: 1,
            },
        );
        ResolveTicket::pending(self.inner.clone(), key, generation, future)
    }

    /// Request and wait
    pub async fn resolve(&self, key: ResolveKey, force: bool) -> Resolution {
        self.request(key, force).wait().await
    }

    /// Forget everything resolved from `descriptor`
    ///
    /// Running resolutions for it still answer their waiters but are not
    /// cached. Returns the number of dropped cache entries.
    pub fn invalidate(&self, descriptor: &Path) -> usize {
        let mut state = self.inner.lock();
        let before = state.cache.len();
        state.cache.retain(|key, _| key.descriptor != descriptor);
        state.in_flight.retain(|key, _| key.descriptor != descriptor);
        let dropped = before - state.cache.len();
        tracing::debug!(descriptor = %descriptor.display(), dropped, "resolution cache invalidated");
        dropped
    }

    pub fn invalidate_all(&self) {
        let mut state = self.inner.lock();
        state.cache.clear();
        state.in_flight.clear();
    }

    pub fn cached(&self, key: &ResolveKey) -> Option<Arc<DependencyTree>> {
        self.inner.lock().cache.get(key).cloned()
    }

    pub fn is_in_flight(&self, key: &ResolveKey) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    /// Resolutions started since creation
    pub fn computations(&self) -> usize {
        self.inner.computations.load(Ordering::SeqCst)
    }

    fn spawn(&self, key: ResolveKey, generation: u64, cancel: CancelFlag) -> SharedResolution {
        self.inner.computations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(descriptor = %key.descriptor.display(), scope = %key.scope, "resolution started");

        let inner = self.inner.clone();
        let task = self.inner.handle.spawn(async move {
            let result = run(&inner, &key, cancel).await;
            inner.finish(&key, generation, &result);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|err| Err(ResolutionError::Worker(err.to_string())))
        }
        .boxed()
        .shared()
    }
}

async fn run(inner: &Inner, key: &ResolveKey, cancel: CancelFlag) -> Resolution {
    let _permit = inner
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|err| ResolutionError::Worker(err.to_string()))?;
    cancel.check()?;

    let resolver = inner.resolver.clone();
    let key = key.clone();
    let tree = tokio::task::spawn_blocking(move || resolver.resolve(&key, &cancel))
        .await
        .map_err(|err| ResolutionError::Worker(err.to_string()))??;
    Ok(Arc::new(tree))
}

enum Slot {
    Ready(Resolution),
    Pending {
        inner: Arc<Inner>,
        generation: u64,
        future: SharedResolution,
    },
    Done,
}

/// One requester's claim on a resolution
///
/// Dropping a ticket that has not produced its result cancels the claim.
pub struct ResolveTicket {
    key: ResolveKey,
    slot: Slot,
}

impl ResolveTicket {
    fn ready(key: ResolveKey, result: Resolution) -> Self {
        Self {
            key,
            slot: Slot::Ready(result),
        }
    }

    fn pending(inner: Arc<Inner>, key: ResolveKey, generation: u64, future: SharedResolution) -> Self {
        Self {
            key,
            slot: Slot::Pending {
                inner,
                generation,
                future,
            },
        }
    }

    pub fn key(&self) -> &ResolveKey {
        &self.key
    }

    /// Result, if the resolution has finished; never blocks
    pub fn try_take(&mut self) -> Option<Resolution> {
        let result = match &self.slot {
            Slot::Ready(result) => result.clone(),
            Slot::Pending { future, .. } => future.clone().now_or_never()?,
            Slot::Done => return None,
        };
        self.slot = Slot::Done;
        Some(result)
    }

    pub async fn wait(mut self) -> Resolution {
        let result = match &self.slot {
            Slot::Ready(result) => result.clone(),
            Slot::Pending { future, .. } => future.clone().await,
            Slot::Done => Err(ResolutionError::Cancelled),
        };
        self.slot = Slot::Done;
        result
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Slot::Pending { inner, generation, .. } = std::mem::replace(&mut self.slot, Slot::Done) {
            inner.release(&self.key, generation);
        }
    }
}

impl Drop for ResolveTicket {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{Artifact, DependencyNode};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn tree(scope: &str) -> DependencyTree {
        DependencyTree::new(DependencyNode::included(
            Artifact::new("org.acme", "app", "1.0"),
            scope,
        ))
    }

    fn key() -> ResolveKey {
        ResolveKey::new("/work/pom.xml", "compile")
    }

    fn counting(calls: Arc<AtomicUsize>, delay: Duration) -> impl DependencyResolver {
        move |key: &ResolveKey, _cancel: &CancelFlag| -> ResolutionResult<DependencyTree> {
            calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(delay);
            Ok(tree(&key.scope))
        }
    }

    async fn eventually(condition: impl Fn() -> bool) -> bool {
        for _ in 0..400 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_requests_share_one_computation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = DerivedDataScheduler::new(
            Handle::current(),
            counting(calls.clone(), Duration::from_millis(100)),
            2,
        );

        let results = futures::future::join_all((0..8).map(|_| scheduler.resolve(key(), false))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].clone().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(result.as_ref().unwrap(), &first));
        }

        // Cached now
        scheduler.resolve(key(), false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        scheduler.resolve(key(), true).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.computations(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failures_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let resolver = move |key: &ResolveKey, _cancel: &CancelFlag| -> ResolutionResult<DependencyTree> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ResolutionError::Failed("repository offline".into()))
            } else {
                Ok(tree(&key.scope))
            }
        };
        let scheduler = DerivedDataScheduler::new(Handle::current(), resolver, 2);

        let err = scheduler.resolve(key(), false).await.unwrap_err();
        assert_eq!(err, ResolutionError::Failed("repository offline".into()));
        assert!(scheduler.cached(&key()).is_none());
        assert!(!scheduler.is_in_flight(&key()));

        scheduler.resolve(key(), false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(scheduler.cached(&key()).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelling_last_ticket_stops_the_resolver() {
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let (s, c) = (started.clone(), stopped.clone());
        let resolver = move |key: &ResolveKey, cancel: &CancelFlag| -> ResolutionResult<DependencyTree> {
            s.store(true, Ordering::SeqCst);
            for _ in 0..500 {
                if let Err(err) = cancel.check() {
                    c.store(true, Ordering::SeqCst);
                    return Err(err);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(tree(&key.scope))
        };
        let scheduler = DerivedDataScheduler::new(Handle::current(), resolver, 1);

        let ticket = scheduler.request(key(), false);
        assert!(eventually(|| started.load(Ordering::SeqCst)).await);

        ticket.cancel();
        assert!(!scheduler.is_in_flight(&key()));
        assert!(eventually(|| stopped.load(Ordering::SeqCst)).await);
        assert!(scheduler.cached(&key()).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_other_waiters_keep_computation_alive() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = DerivedDataScheduler::new(
            Handle::current(),
            counting(calls.clone(), Duration::from_millis(50)),
            2,
        );

        let first = scheduler.request(key(), false);
        let second = scheduler.request(key(), false);
        first.cancel();

        let tree = second.wait().await.unwrap();
        assert_eq!(tree.root.scope, "compile");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.cached(&key()).is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forced_request_joins_running_computation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = DerivedDataScheduler::new(
            Handle::current(),
            counting(calls.clone(), Duration::from_millis(50)),
            2,
        );

        let plain = scheduler.request(key(), false);
        let forced = scheduler.request(key(), true);
        assert_eq!(scheduler.computations(), 1);

        let (a, b) = futures::join!(plain.wait(), forced.wait());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalidate_drops_cached_tree() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = DerivedDataScheduler::new(Handle::current(), counting(calls.clone(), Duration::ZERO), 2);

        scheduler.resolve(key(), false).await.unwrap();
        scheduler.resolve(ResolveKey::new("/work/other.xml", "compile"), false).await.unwrap();

        assert_eq!(scheduler.invalidate(Path::new("/work/pom.xml")), 1);
        assert!(scheduler.cached(&key()).is_none());

        scheduler.resolve(key(), false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_worker_pool_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        let resolver = move |key: &ResolveKey, _cancel: &CancelFlag| -> ResolutionResult<DependencyTree> {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(tree(&key.scope))
        };
        let scheduler = DerivedDataScheduler::new(Handle::current(), resolver, 1);

        let keys = ["compile", "test", "runtime"].map(|scope| ResolveKey::new("/work/pom.xml", scope));
        let results = futures::future::join_all(keys.into_iter().map(|k| scheduler.resolve(k, false))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_try_take_without_blocking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = DerivedDataScheduler::new(
            Handle::current(),
            counting(calls.clone(), Duration::from_millis(20)),
            2,
        );

        let mut ticket = scheduler.request(key(), false);
        let mut result = None;
        for _ in 0..400 {
            result = ticket.try_take();
            if result.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(result.unwrap().is_ok());
        assert!(ticket.try_take().is_none());

        let mut cached = scheduler.request(key(), false);
        assert!(cached.try_take().is_some());
    }
}
