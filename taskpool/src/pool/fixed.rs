//! Fixed pool: a constant worker count draining one shared queue.
//!
//! The baseline policy. `start` creates the workers once and the count
//! never changes afterwards. Submissions push into a single FIFO
//! guarded by one mutex; workers pop from it and release the mutex
//! before running the task body, so user code never executes under a
//! pool lock.
//!
//! Shutdown is cooperative: dropping the pool flips the state to
//! `Exiting`, wakes every parked worker, and blocks until the roster
//! is empty. Workers first run down whatever the queue still holds, so
//! accepted work is never dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, warn};

use crate::error::SubmitError;
use crate::pool::config::{PoolConfig, SUBMIT_WAIT};
use crate::state::{AtomicPoolState, PoolState};
use crate::task::Task;
use crate::worker::Worker;

/// Queue contents and worker roster, guarded by one mutex.
struct FixedInner {
    queue: VecDeque<Task>,
    workers: HashMap<usize, Worker>,
}

struct FixedShared {
    state: AtomicPoolState,
    inner: Mutex<FixedInner>,
    /// Signalled when queue space frees up; submitters wait here.
    not_full: Condvar,
    /// Signalled when tasks arrive; workers wait here.
    not_empty: Condvar,
    /// Signalled by retiring workers; the drop path waits here.
    all_exit: Condvar,
    task_count: AtomicUsize,
    idle_threads: AtomicUsize,
    cur_threads: AtomicUsize,
    task_max_count: AtomicUsize,
}

/// Shared-queue pool with a fixed worker count.
pub struct FixedPool {
    shared: Arc<FixedShared>,
}

impl FixedPool {
    /// Creates an unstarted pool with default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates an unstarted pool from explicit knobs.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(FixedShared {
                state: AtomicPoolState::new(PoolState::Init),
                inner: Mutex::new(FixedInner {
                    queue: VecDeque::new(),
                    workers: HashMap::new(),
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                all_exit: Condvar::new(),
                task_count: AtomicUsize::new(0),
                idle_threads: AtomicUsize::new(0),
                cur_threads: AtomicUsize::new(0),
                task_max_count: AtomicUsize::new(config.task_max_count),
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

    /// Starts `init_threads` workers and begins accepting submissions.
    pub fn start(&self, init_threads: usize) {
        if !self
            .shared
            .state
            .transition(PoolState::Init, PoolState::Running)
        {
            warn!("start ignored: pool is not in the init state");
            return;
        }

        let mut inner = self.shared.inner.lock().unwrap();
        for _ in 0..init_threads {
            let worker = Worker::new();
            inner.workers.insert(worker.id(), worker);
        }
        for worker in inner.workers.values() {
            let shared = Arc::clone(&self.shared);
            worker.start(move |id| Self::worker_loop(shared, id));
        }
        self.shared.cur_threads.store(init_threads, Ordering::Release);
        self.shared
            .idle_threads
            .store(init_threads, Ordering::Release);
        debug!(workers = init_threads, "fixed pool started");
    }

    /// Enqueues a work item, waiting up to a second for queue space.
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

    fn worker_loop(shared: Arc<FixedShared>, worker_id: usize) {
        loop {
            let task = {
                let inner = shared.inner.lock().unwrap();
                let mut inner = shared
                    .not_empty
                    .wait_while(inner, |inner| {
                        inner.queue.is_empty() && shared.state.load() == PoolState::Running
                    })
                    .unwrap();

                // An empty queue here means shutdown; a non-empty one
                // is drained even while exiting.
                match inner.queue.pop_front() {
                    Some(task) => {
                        shared.idle_threads.fetch_sub(1, Ordering::AcqRel);
                        shared.task_count.fetch_sub(1, Ordering::AcqRel);
                        if !inner.queue.is_empty() {
                            shared.not_empty.notify_all();
                        }
                        shared.not_full.notify_all();
                        task
                    }
                    None => break,
                }
            };

            task.run();
            shared.idle_threads.fetch_add(1, Ordering::AcqRel);
        }

        Self::retire(&shared, worker_id);
    }

    fn retire(shared: &Arc<FixedShared>, worker_id: usize) {
        let mut inner = shared.inner.lock().unwrap();
        inner.workers.remove(&worker_id);
        shared.idle_threads.fetch_sub(1, Ordering::AcqRel);
        shared.cur_threads.fetch_sub(1, Ordering::AcqRel);
        shared.all_exit.notify_all();
        debug!(worker_id, "fixed pool worker retired");
    }
}

impl Default for FixedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FixedPool {
    /// Blocks until every worker has retired. Tasks accepted before
    /// the drop are drained first.
    fn drop(&mut self) {
        self.shared.state.store(PoolState::Exiting);

        // The queue mutex is taken before broadcasting so every worker
        // is either running a task or parked on the condvar when the
        // wake-up lands.
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
