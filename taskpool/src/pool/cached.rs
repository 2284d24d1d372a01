//! Cached pool: a shared queue with elastic worker growth.
//!
//! Starts like the fixed pool but grows one worker at a time whenever
//! a submission finds more queued work than idle workers, up to a
//! configurable ceiling. Extra workers poll the queue once a second
//! while idle and retire after sitting out the idle timeout; the pool
//! never shrinks below the initial count.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::SubmitError;
use crate::pool::config::{PoolConfig, IDLE_POLL_INTERVAL, SUBMIT_WAIT};
use crate::state::{AtomicPoolState, PoolState};
use crate::task::Task;
use crate::worker::Worker;

struct CachedInner {
    queue: VecDeque<Task>,
    workers: HashMap<usize, Worker>,
}

struct CachedShared {
    state: AtomicPoolState,
    inner: Mutex<CachedInner>,
    not_full: Condvar,
    not_empty: Condvar,
    all_exit: Condvar,
    task_count: AtomicUsize,
    idle_threads: AtomicUsize,
    cur_threads: AtomicUsize,
    init_threads: AtomicUsize,
    task_max_count: AtomicUsize,
    thread_max_count: AtomicUsize,
    idle_timeout_secs: AtomicU64,
}

/// Shared-queue pool with an elastic worker count.
pub struct CachedPool {
    shared: Arc<CachedShared>,
}

impl CachedPool {
    /// Creates an unstarted pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates an unstarted pool from explicit knobs.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(CachedShared {
                state: AtomicPoolState::new(PoolState::Init),
                inner: Mutex::new(CachedInner {
                    queue: VecDeque::new(),
                    workers: HashMap::new(),
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                all_exit: Condvar::new(),
                task_count: AtomicUsize::new(0),
                idle_threads: AtomicUsize::new(0),
                cur_threads: AtomicUsize::new(0),
                init_threads: AtomicUsize::new(0),
                task_max_count: AtomicUsize::new(config.task_max_count),
                thread_max_count: AtomicUsize::new(config.thread_max_count),
                idle_timeout_secs: AtomicU64::new(config.thread_idle_timeout.as_secs()),
            }),
        }
    }

    /// Sets the shared-queue capacity. Honored only before `start`.
    pub fn set_task_max_count(&self, max: usize) {
        if self.shared.state.load() != PoolState::Init {
            warn!("set_task_max_count ignored: pool already started");
            return;
        }
        self.shared.task_max_count.store(max, Ordering::Release);
    }

    /// Sets the worker ceiling. Honored only before `start`.
    pub fn set_thread_max_count(&self, max: usize) {
        if self.shared.state.load() != PoolState::Init {
            warn!("set_thread_max_count ignored: pool already started");
            return;
        }
        self.shared.thread_max_count.store(max, Ordering::Release);
    }

    /// Sets the idle reap timeout. Honored only before `start`.
    pub fn set_thread_idle_timeout(&self, timeout: Duration) {
        if self.shared.state.load() != PoolState::Init {
            warn!("set_thread_idle_timeout ignored: pool already started");
            return;
        }
        self.shared
            .idle_timeout_secs
            .store(timeout.as_secs(), Ordering::Release);
    }

    /// Starts the initial workers, clamped to the worker ceiling.
    pub fn start(&self, init_threads: usize) {
        if !self
            .shared
            .state
            .transition(PoolState::Init, PoolState::Running)
        {
            warn!("start ignored: pool is not in the init state");
            return;
        }

        let max = self.shared.thread_max_count.load(Ordering::Acquire);
        let count = init_threads.min(max);
        self.shared.init_threads.store(count, Ordering::Release);

        let mut inner = self.shared.inner.lock().unwrap();
        for _ in 0..count {
            let worker = Worker::new();
            inner.workers.insert(worker.id(), worker);
        }
        for worker in inner.workers.values() {
            let shared = Arc::clone(&self.shared);
            worker.start(move |id| Self::worker_loop(shared, id));
        }
        self.shared.cur_threads.store(count, Ordering::Release);
        self.shared.idle_threads.store(count, Ordering::Release);
        debug!(workers = count, "cached pool started");
    }

    /// Enqueues a work item, waiting up to a second for queue space,
    /// and grows the pool when queued work outnumbers idle workers.
    pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
        let shared = &self.shared;
        if shared.state.load() != PoolState::Running {
            return Err(SubmitError::PoolNotRunning);
        }

        let max = shared.task_max_count.load(Ordering::Acquire);
        let inner = shared.inner.lock().unwrap();
        let (mut inner, timeout) = shared
            .not_full
            .wait_timeout_while(inner, SUBMIT_WAIT, |inner| inner.queue.len() >= max)
            .unwrap();
        if timeout.timed_out() && inner.queue.len() >= max {
            return Err(SubmitError::TaskQueueOverflow);
        }
        // Re-checked under the mutex so a task cannot slip in behind a
        // shutdown that already drained the queue.
        if shared.state.load() != PoolState::Running {
            return Err(SubmitError::PoolNotRunning);
        }

        inner.queue.push_back(task);
        shared.task_count.fetch_add(1, Ordering::Release);
        shared.not_empty.notify_all();

        // Elastic growth, decided inside the same critical section the
        // workers use, so the counter comparison cannot race a pop.
        if shared.task_count.load(Ordering::Acquire) > shared.idle_threads.load(Ordering::Acquire)
            && shared.cur_threads.load(Ordering::Acquire)
                < shared.thread_max_count.load(Ordering::Acquire)
        {
            let worker = Worker::new();
            let id = worker.id();
            inner.workers.insert(id, worker);
            if let Some(worker) = inner.workers.get(&id) {
                let loop_shared = Arc::clone(shared);
                worker.start(move |wid| Self::worker_loop(loop_shared, wid));
            }
            shared.cur_threads.fetch_add(1, Ordering::AcqRel);
            shared.idle_threads.fetch_add(1, Ordering::AcqRel);
            debug!(worker_id = id, "cached pool grew by one worker");
        }

        Ok(())
    }

    /// Number of live workers.
    pub fn cur_thread_count(&self) -> usize {
        self.shared.cur_threads.load(Ordering::Acquire)
    }

    /// Workers currently parked on the empty queue.
    pub fn idle_thread_count(&self) -> usize {
        self.shared.idle_threads.load(Ordering::Acquire)
    }

    /// Tasks queued but not yet started.
    pub fn queued_task_count(&self) -> usize {
        self.shared.task_count.load(Ordering::Acquire)
    }

    fn worker_loop(shared: Arc<CachedShared>, worker_id: usize) {
        let mut last_active = Instant::now();
        while let Some(task) = Self::next_task(&shared, last_active) {
            task.run();
            shared.idle_threads.fetch_add(1, Ordering::AcqRel);
            last_active = Instant::now();
        }
        Self::retire(&shared, worker_id);
    }

    /// Blocks until a task is available. `None` means this worker is
    /// done: the shutdown drain finished, or it idled out above the
    /// initial count. Either way `cur_threads` has already been
    /// released inside the critical section, so concurrent idle checks
    /// see the updated count and cannot over-retire.
    fn next_task(shared: &CachedShared, last_active: Instant) -> Option<Task> {
        let mut inner = shared.inner.lock().unwrap();
        loop {
            if let Some(task) = inner.queue.pop_front() {
                shared.idle_threads.fetch_sub(1, Ordering::AcqRel);
                shared.task_count.fetch_sub(1, Ordering::AcqRel);
                if !inner.queue.is_empty() {
                    shared.not_empty.notify_all();
                }
                shared.not_full.notify_all();
                return Some(task);
            }
            if shared.state.load() == PoolState::Exiting {
                shared.cur_threads.fetch_sub(1, Ordering::AcqRel);
                return None;
            }

            let (guard, timeout) = shared
                .not_empty
                .wait_timeout(inner, IDLE_POLL_INTERVAL)
                .unwrap();
            inner = guard;
            if timeout.timed_out() && Self::try_idle_retire(shared, last_active) {
                return None;
            }
        }
    }

    /// Decides, with the queue mutex held, whether this worker has
    /// been idle long enough to retire. A positive decision releases
    /// its `cur_threads` slot immediately.
    fn try_idle_retire(shared: &CachedShared, last_active: Instant) -> bool {
        if shared.cur_threads.load(Ordering::Acquire) <= shared.init_threads.load(Ordering::Acquire)
        {
            return false;
        }
        let max_idle = Duration::from_secs(shared.idle_timeout_secs.load(Ordering::Acquire));
        if last_active.elapsed() <= max_idle {
            return false;
        }
        shared.cur_threads.fetch_sub(1, Ordering::AcqRel);
        true
    }

    fn retire(shared: &Arc<CachedShared>, worker_id: usize) {
        let mut inner = shared.inner.lock().unwrap();
        inner.workers.remove(&worker_id);
        shared.idle_threads.fetch_sub(1, Ordering::AcqRel);
        shared.all_exit.notify_all();
        debug!(worker_id, "cached pool worker retired");
    }
}

impl Default for CachedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CachedPool {
    /// Blocks until every worker has retired. Tasks accepted before
    /// the drop are drained first.
    fn drop(&mut self) {
        self.shared.state.store(PoolState::Exiting);

        let inner = self.shared.inner.lock().unwrap();
        self.shared.not_empty.notify_all();
        drop(
            self.shared
                .all_exit
                .wait_while(inner, |inner| !inner.workers.is_empty())
                .unwrap(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

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

    fn sleeper(millis: u64) -> Task {
        Task::new(move || thread::sleep(Duration::from_millis(millis)))
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let pool = CachedPool::new();
        assert_eq!(
            pool.submit(Task::new(|| {})),
            Err(SubmitError::PoolNotRunning)
        );
    }

    #[test]
    fn test_start_is_clamped_to_ceiling() {
        let pool = CachedPool::with_config(PoolConfig::default().with_thread_max_count(2));
        pool.start(8);
        assert_eq!(pool.cur_thread_count(), 2);
    }

    #[test]
    fn test_burst_grows_to_ceiling_then_shrinks() {
        let pool = CachedPool::with_config(
            PoolConfig::default()
                .with_thread_max_count(10)
                .with_thread_idle_timeout(Duration::from_secs(1)),
        );
        pool.start(4);

        for _ in 0..8 {
            pool.submit(sleeper(500)).unwrap();
        }
        assert!(wait_until(Duration::from_millis(500), || {
            pool.cur_thread_count() == 8
        }));

        // All tasks finish after ~500ms; the four extra workers sit
        // out the one second idle timeout and retire.
        assert!(wait_until(Duration::from_secs(6), || {
            pool.cur_thread_count() == 4
        }));
        assert_eq!(pool.queued_task_count(), 0);
    }

    #[test]
    fn test_growth_never_exceeds_ceiling() {
        let pool = CachedPool::with_config(
            PoolConfig::default()
                .with_thread_max_count(5)
                .with_thread_idle_timeout(Duration::from_secs(1)),
        );
        pool.start(2);

        for _ in 0..12 {
            pool.submit(sleeper(200)).unwrap();
        }
        assert!(wait_until(Duration::from_secs(2), || {
            pool.cur_thread_count() == 5
        }));
        assert!(pool.cur_thread_count() <= 5);
    }

    #[test]
    fn test_setters_ignored_after_start() {
        let pool = CachedPool::with_config(PoolConfig::default().with_thread_max_count(2));
        pool.start(1);
        pool.set_thread_max_count(16);

        for _ in 0..8 {
            pool.submit(sleeper(200)).unwrap();
        }
        thread::sleep(Duration::from_millis(100));
        assert!(pool.cur_thread_count() <= 2);
    }

    #[test]
    fn test_drop_drains_accepted_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = CachedPool::new();
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
}
