//! Active pool: per-worker dual queues with role swapping.
//!
//! There is no central queue. Every worker owns two FIFO queues whose
//! roles rotate: submitters push into the public one, the worker
//! drains the private one, and the two swap contents once the private
//! side runs dry. Submissions target the worker with the smallest
//! public backlog.
//!
//! Each queue is guarded by its own spinlock and mirrored by an atomic
//! counter, so the dispatch scan reads depths without taking any lock.
//! The only blocking rendezvous is a pool-wide condvar that parks
//! workers whose queues are both empty.
//!
//! Lock order during a swap is always public before private, the same
//! order every other path uses, so the handoff cannot deadlock against
//! a concurrent submission.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;

use tracing::{debug, warn};

use crate::error::SubmitError;
use crate::pool::config::{PoolConfig, ACTIVE_THREAD_MAX_COUNT, SUBMIT_RETRY_DELAY};
use crate::spinlock::SpinLock;
use crate::state::{AtomicPoolState, PoolState};
use crate::task::Task;
use crate::worker::Worker;

/// Outcome of a worker's attempt to rotate its queue roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SwapOutcome {
    /// The private queue still holds work; keep draining it.
    KeepDraining,
    /// Roles swapped; the former public batch is now private.
    Swapped,
    /// Both queues are empty; the worker should park.
    AllEmpty,
}

/// Per-worker queue pair for the active pool.
///
/// Submitters only ever touch the public side; the owning worker only
/// ever drains the private side.
pub(crate) struct DualQueueWorker {
    public_q: SpinLock<VecDeque<Task>>,
    private_q: SpinLock<VecDeque<Task>>,
    public_count: AtomicUsize,
    private_count: AtomicUsize,
}

impl DualQueueWorker {
    fn new() -> Self {
        Self {
            public_q: SpinLock::new(VecDeque::new()),
            private_q: SpinLock::new(VecDeque::new()),
            public_count: AtomicUsize::new(0),
            private_count: AtomicUsize::new(0),
        }
    }

    /// Appends a submission to the public queue. The spinlock is held
    /// for a single push.
    fn give_task(&self, task: Task) {
        let mut queue = self.public_q.lock();
        queue.push_back(task);
        self.public_count.fetch_add(1, Ordering::Release);
    }

    fn public_task_count(&self) -> usize {
        self.public_count.load(Ordering::Acquire)
    }

    /// Combined depth of both queues.
    fn task_count(&self) -> usize {
        self.public_count.load(Ordering::Acquire) + self.private_count.load(Ordering::Acquire)
    }

    /// Rotates the queue roles if the private side is exhausted and
    /// the public side has work. Only the owning worker calls this.
    fn try_swap(&self) -> SwapOutcome {
        if self.private_count.load(Ordering::Acquire) > 0 {
            return SwapOutcome::KeepDraining;
        }
        if self.public_count.load(Ordering::Acquire) == 0 {
            return SwapOutcome::AllEmpty;
        }
        self.swap_queues();
        SwapOutcome::Swapped
    }

    /// Swaps queue contents and counters as a pair, public lock first.
    /// Holding both locks keeps every observer's `(queue, count)` view
    /// consistent per role.
    fn swap_queues(&self) {
        let mut public_q = self.public_q.lock();
        let mut private_q = self.private_q.lock();
        std::mem::swap(&mut *public_q, &mut *private_q);
        let moved = self
            .public_count
            .swap(self.private_count.load(Ordering::Acquire), Ordering::AcqRel);
        self.private_count.store(moved, Ordering::Release);
    }

    /// Takes the whole private batch and runs it in arrival order. The
    /// spinlock is released before any task body runs.
    fn drain_private(&self) {
        let batch = {
            let mut queue = self.private_q.lock();
            self.private_count.store(0, Ordering::Release);
            std::mem::take(&mut *queue)
        };
        for task in batch {
            task.run();
        }
    }
}

struct ActiveShared {
    state: AtomicPoolState,
    /// Set exactly once by `start`; dispatch scans it without a lock.
    workers: OnceLock<Vec<Arc<DualQueueWorker>>>,
    cur_threads: AtomicUsize,
    task_max_count: AtomicUsize,
    /// Parking lot for workers whose queues are both empty.
    wait_lock: Mutex<()>,
    not_empty: Condvar,
    all_exit: Condvar,
}

/// Pool dispatching each submission to its least-loaded worker.
pub struct ActivePool {
    shared: Arc<ActiveShared>,
}

impl ActivePool {
    /// Creates an unstarted pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::active())
    }

    /// Creates an unstarted pool from explicit knobs.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(ActiveShared {
                state: AtomicPoolState::new(PoolState::Init),
                workers: OnceLock::new(),
                cur_threads: AtomicUsize::new(0),
                task_max_count: AtomicUsize::new(config.task_max_count),
                wait_lock: Mutex::new(()),
                not_empty: Condvar::new(),
                all_exit: Condvar::new(),
            }),
        }
    }

    /// Sets the per-worker public-queue capacity. Honored only before
    /// `start`.
    pub fn set_task_max_count(&self, max: usize) {
        if self.shared.state.load() != PoolState::Init {
            warn!("set_task_max_count ignored: pool already started");
            return;
        }
        self.shared.task_max_count.store(max, Ordering::Release);
    }

    /// Starts the workers, clamped to the worker ceiling.
    pub fn start(&self, init_threads: usize) {
        if !self
            .shared
            .state
            .transition(PoolState::Init, PoolState::Running)
        {
            warn!("start ignored: pool is not in the init state");
            return;
        }

        let count = init_threads.min(ACTIVE_THREAD_MAX_COUNT);
        let mut pending = Vec::with_capacity(count);
        for _ in 0..count {
            let worker = Worker::new();
            let queues = Arc::new(DualQueueWorker::new());
            pending.push((worker, queues));
        }

        let roster: Vec<_> = pending.iter().map(|(_, q)| Arc::clone(q)).collect();
        let _ = self.shared.workers.set(roster);
        self.shared.cur_threads.store(count, Ordering::Release);

        for (worker, queues) in pending {
            let shared = Arc::clone(&self.shared);
            worker.start(move |id| Self::worker_loop(shared, queues, id));
        }
        debug!(workers = count, "active pool started");
    }

    /// Dispatches a work item to the least-loaded worker, backing off
    /// one second and retrying once when every public queue is full.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        if self.shared.state.load() != PoolState::Running {
            return Err(SubmitError::PoolNotRunning);
        }
        let Some(workers) = self.shared.workers.get() else {
            return Err(SubmitError::PoolNotRunning);
        };

        let task = match self.try_dispatch(workers, task) {
            Ok(()) => {
                self.notify_not_empty();
                return Ok(());
            }
            Err(task) => task,
        };

        warn!("active pool is busy; backing off before one retry");
        thread::sleep(SUBMIT_RETRY_DELAY);

        match self.try_dispatch(workers, task) {
            Ok(()) => {
                self.notify_not_empty();
                Ok(())
            }
            Err(_) => Err(SubmitError::TaskQueueOverflow),
        }
    }

    /// Number of live workers.
    pub fn cur_thread_count(&self) -> usize {
        self.shared.cur_threads.load(Ordering::Acquire)
    }

    /// Public-queue depth per started worker, in worker order.
    pub fn public_task_counts(&self) -> Vec<usize> {
        self.shared
            .workers
            .get()
            .map(|workers| workers.iter().map(|w| w.public_task_count()).collect())
            .unwrap_or_default()
    }

    /// Total queued-but-not-started depth across all workers.
    pub fn queued_task_count(&self) -> usize {
        self.shared
            .workers
            .get()
            .map(|workers| workers.iter().map(|w| w.task_count()).sum())
            .unwrap_or(0)
    }

    /// Hands the task to the worker with the smallest public backlog,
    /// first-found on ties. Gives the task back untouched when every
    /// worker is at capacity, so a retry moves it exactly once.
    fn try_dispatch(&self, workers: &[Arc<DualQueueWorker>], task: Task) -> Result<(), Task> {
        let Some((target, min_count)) = workers
            .iter()
            .enumerate()
            .map(|(index, worker)| (index, worker.public_task_count()))
            .min_by_key(|&(_, count)| count)
        else {
            return Err(task);
        };

        if min_count >= self.shared.task_max_count.load(Ordering::Acquire) {
            return Err(task);
        }
        workers[target].give_task(task);
        Ok(())
    }

    /// Wakes parked workers. The wait mutex is taken so the signal
    /// cannot land between a worker's emptiness check and its wait.
    fn notify_not_empty(&self) {
        let _guard = self.shared.wait_lock.lock().unwrap();
        self.shared.not_empty.notify_all();
    }

    fn worker_loop(shared: Arc<ActiveShared>, queues: Arc<DualQueueWorker>, worker_id: usize) {
        while shared.state.load() == PoolState::Running {
            match queues.try_swap() {
                SwapOutcome::AllEmpty => {
                    let guard = shared.wait_lock.lock().unwrap();
                    drop(
                        shared
                            .not_empty
                            .wait_while(guard, |_| {
                                queues.public_task_count() == 0
                                    && shared.state.load() != PoolState::Exiting
                            })
                            .unwrap(),
                    );
                }
                SwapOutcome::Swapped | SwapOutcome::KeepDraining => queues.drain_private(),
            }
        }

        // Run down whatever both queues still hold before retiring, so
        // accepted work is never dropped.
        while queues.try_swap() != SwapOutcome::AllEmpty {
            queues.drain_private();
        }

        shared.cur_threads.fetch_sub(1, Ordering::AcqRel);
        let _guard = shared.wait_lock.lock().unwrap();
        shared.all_exit.notify_all();
        debug!(worker_id, "active pool worker retired");
    }
}

impl Default for ActivePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActivePool {
    /// Blocks until every worker has drained its queues and retired.
    fn drop(&mut self) {
        self.shared.state.store(PoolState::Exiting);

        let guard = self.shared.wait_lock.lock().unwrap();
        self.shared.not_empty.notify_all();
        drop(
            self.shared
                .all_exit
                .wait_while(guard, |_| {
                    self.shared.cur_threads.load(Ordering::Acquire) > 0
                })
                .unwrap(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if pred() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        pred()
    }

    fn recording_task(order: &Arc<Mutex<Vec<usize>>>, value: usize) -> Task {
        let order = Arc::clone(order);
        Task::new(move || order.lock().unwrap().push(value))
    }

    #[test]
    fn test_give_task_tracks_public_depth() {
        let worker = DualQueueWorker::new();
        worker.give_task(Task::new(|| {}));
        worker.give_task(Task::new(|| {}));
        assert_eq!(worker.public_task_count(), 2);
        assert_eq!(worker.task_count(), 2);
    }

    #[test]
    fn test_swap_moves_batch_to_private_side() {
        let worker = DualQueueWorker::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            worker.give_task(recording_task(&order, i));
        }

        assert_eq!(worker.try_swap(), SwapOutcome::Swapped);
        assert_eq!(worker.public_task_count(), 0);
        assert_eq!(worker.task_count(), 3);

        worker.drain_private();
        assert_eq!(worker.task_count(), 0);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(worker.try_swap(), SwapOutcome::AllEmpty);
    }

    #[test]
    fn test_swap_preserves_arrival_order_across_batches() {
        let worker = DualQueueWorker::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        worker.give_task(recording_task(&order, 0));
        worker.give_task(recording_task(&order, 1));
        assert_eq!(worker.try_swap(), SwapOutcome::Swapped);
        worker.give_task(recording_task(&order, 2));
        worker.drain_private();
        assert_eq!(worker.try_swap(), SwapOutcome::Swapped);
        worker.drain_private();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_swap_reports_pending_private_work() {
        let worker = DualQueueWorker::new();
        worker.give_task(Task::new(|| {}));
        assert_eq!(worker.try_swap(), SwapOutcome::Swapped);
        worker.give_task(Task::new(|| {}));
        // Private side still loaded, so roles must not rotate yet.
        assert_eq!(worker.try_swap(), SwapOutcome::KeepDraining);
        assert_eq!(worker.public_task_count(), 1);
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let pool = ActivePool::new();
        assert_eq!(
            pool.submit(Task::new(|| {})),
            Err(SubmitError::PoolNotRunning)
        );
    }

    #[test]
    fn test_single_worker_runs_in_submission_order() {
        let pool = ActivePool::new();
        pool.start(1);

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            pool.submit(recording_task(&order, i)).unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || {
            order.lock().unwrap().len() == 50
        }));
        assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_overflow_after_one_backoff_retry() {
        let pool = ActivePool::with_config(PoolConfig::active().with_task_max_count(1));
        pool.start(1);

        let entered = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            pool.submit(Task::new(move || {
                entered.store(true, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }))
            .unwrap();
        }
        assert!(wait_until(Duration::from_secs(5), || {
            entered.load(Ordering::SeqCst)
        }));

        // Fills the single public slot while the worker is occupied.
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&counter);
            pool.submit(Task::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        let start = Instant::now();
        let result = pool.submit(Task::new(|| {}));
        assert_eq!(result, Err(SubmitError::TaskQueueOverflow));
        assert!(start.elapsed() >= Duration::from_millis(900));

        release.store(true, Ordering::SeqCst);
        assert!(wait_until(Duration::from_secs(5), || {
            counter.load(Ordering::SeqCst) == 1
        }));
    }

    #[test]
    fn test_set_task_max_count_ignored_after_start() {
        let pool = ActivePool::new();
        pool.start(1);
        pool.set_task_max_count(1);

        let entered = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));
        {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            pool.submit(Task::new(move || {
                entered.store(true, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }))
            .unwrap();
        }
        assert!(wait_until(Duration::from_secs(5), || {
            entered.load(Ordering::SeqCst)
        }));

        // The rejected cap of one would refuse the second of these.
        let start = Instant::now();
        assert!(pool.submit(Task::new(|| {})).is_ok());
        assert!(pool.submit(Task::new(|| {})).is_ok());
        assert!(start.elapsed() < Duration::from_millis(500));

        release.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_drop_drains_both_queues() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ActivePool::new();
            pool.start(2);
            for _ in 0..100 {
                let counter = Arc::clone(&counter);
                pool.submit(Task::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_counts_settle_after_completion() {
        let pool = ActivePool::new();
        pool.start(4);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..40 {
            let counter = Arc::clone(&counter);
            pool.submit(Task::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || {
            counter.load(Ordering::SeqCst) == 40
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            pool.queued_task_count() == 0
        }));
        assert_eq!(pool.cur_thread_count(), 4);
    }
}
