use ahash::AHashSet;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::target::Target;

/// Targets already handed to a worker in this scan.
#[derive(Debug, Default)]
pub struct DispatchedSet {
    inner: Mutex<AHashSet<Target>>,
}

impl DispatchedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-and-insert under one lock. Returns `true` if the caller now owns `target`.
    pub fn try_dispatch(&self, target: &Target) -> bool {
        let mut set = self.inner.lock();
        if set.contains(target) {
            false
        } else {
            set.insert(target.clone());
            true
        }
    }

    /// Pre-mark targets restored from a checkpoint.
    pub fn mark<I: IntoIterator<Item = Target>>(&self, targets: I) {
        self.inner.lock().extend(targets);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub dispatched: usize,
    pub skipped: usize,
    pub completed: usize,
    /// Targets whose worker task panicked. They never reached the reporter.
    pub panicked: Vec<Target>,
    pub cancelled: bool,
}

/// Bounded pool of probe workers fed from a lazy target sequence.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    completed: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize, cancel: CancellationToken) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            completed: Arc::new(AtomicUsize::new(0)),
            cancel,
        }
    }

    /// Run `task` once per not-yet-dispatched target, at most `workers` at a time.
    ///
    /// On cancellation no further target is dispatched; in-flight tasks are awaited.
    pub async fn drive<I, F, Fut>(&self, targets: I, dispatched: &DispatchedSet, task: F) -> PoolStats
    where
        I: IntoIterator<Item = Target>,
        F: Fn(Target) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut stats = PoolStats::default();
        let mut running = FuturesUnordered::new();

        for target in targets {
            if self.cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    stats.cancelled = true;
                    break;
                }
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            if !dispatched.try_dispatch(&target) {
                debug!(url = %target, "already dispatched, skipping");
                stats.skipped += 1;
                continue;
            }
            stats.dispatched += 1;

            let completed = self.completed.clone();
            let fut = task(target.clone());
            let handle = tokio::spawn(async move {
                fut.await;
                completed.fetch_add(1, Ordering::Relaxed);
                drop(permit);
            });
            running.push(async move { (target, handle.await) });

            // reap whatever already finished so the set stays small
            while let Some(Some(done)) = running.next().now_or_never() {
                Self::settle(done, &mut stats);
            }
        }

        while let Some(done) = running.next().await {
            Self::settle(done, &mut stats);
        }
        stats
    }

    fn settle(done: (Target, Result<(), tokio::task::JoinError>), stats: &mut PoolStats) {
        match done {
            (_, Ok(())) => stats.completed += 1,
            (target, Err(e)) => {
                error!(url = %target, error = %e, "worker task failed");
                stats.panicked.push(target);
            }
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn targets(n: usize) -> Vec<Target> {
        (0..n).map(|i| Target::new(format!("http://example.com/{i}"))).collect()
    }

    #[test]
    fn try_dispatch_is_test_and_insert() {
        let set = DispatchedSet::new();
        let t = Target::from("a.example.com");
        assert!(set.try_dispatch(&t));
        assert!(!set.try_dispatch(&t));
        set.mark(vec![Target::from("b.example.com")]);
        assert!(!set.try_dispatch(&Target::from("b.example.com")));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn every_distinct_target_runs_once() {
        let pool = WorkerPool::new(4, CancellationToken::new());
        let dispatched = DispatchedSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut input = targets(20);
        input.extend(targets(5));
        let stats = pool
            .drive(input, &dispatched, |t| {
                let seen = seen.clone();
                async move { seen.lock().push(t) }
            })
            .await;

        assert_eq!(stats.dispatched, 20);
        assert_eq!(stats.skipped, 5);
        assert_eq!(stats.completed, 20);
        assert_eq!(seen.lock().len(), 20);
        assert_eq!(pool.completed(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let pool = WorkerPool::new(3, CancellationToken::new());
        let dispatched = DispatchedSet::new();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        pool.drive(targets(12), &dispatched, |_| {
            let live = live.clone();
            let peak = peak.clone();
            async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                live.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_dispatch_but_lets_in_flight_finish() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(2, cancel.clone());
        let dispatched = DispatchedSet::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let stats = pool
            .drive(targets(10), &dispatched, |_| {
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert!(stats.cancelled);
        assert_eq!(stats.dispatched, 2);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert_eq!(dispatched.len(), 2);
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let pool = WorkerPool::new(2, CancellationToken::new());
        let dispatched = DispatchedSet::new();
        let stats = pool
            .drive(targets(3), &dispatched, |t| async move {
                if t.as_str().ends_with("/1") {
                    panic!("boom");
                }
            })
            .await;
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.panicked, vec![Target::from("http://example.com/1")]);
    }
}
