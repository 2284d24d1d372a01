//! Facade selecting a scheduling policy behind one submission API.
//!
//! The facade bridges typed callables into opaque work items: `submit`
//! binds the callable to a fresh result channel, boxes the pair into a
//! [`Task`], and forwards it to the chosen policy. Submitters always
//! get a handle back; lifecycle and overflow failures are logged and
//! converted into a handle that is already ready with `R::default()`.

use std::fmt;
use std::time::Duration;

use tracing::error;

use crate::error::SubmitError;
use crate::pool::active::ActivePool;
use crate::pool::cached::CachedPool;
use crate::pool::fixed::FixedPool;
use crate::pool::PoolBackend;
use crate::task::{result_channel, ResultHandle, Task};

/// Scheduling policy chosen at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolMode {
    /// Constant worker count, one shared queue.
    #[default]
    Fixed,
    /// Elastic worker count with idle reaping, one shared queue.
    Cached,
    /// Per-worker dual queues; submitters target the least loaded.
    Active,
}

impl fmt::Display for PoolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "Fixed"),
            Self::Cached => write!(f, "Cached"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// Task execution pool with a selectable scheduling policy.
///
/// Dropping the pool shuts it down: the state flips to exiting, every
/// worker drains and retires, and the drop blocks until the last one
/// has done so.
pub struct ThreadPool {
    mode: PoolMode,
    backend: Box<dyn PoolBackend>,
}

impl ThreadPool {
    /// Creates an unstarted pool running the given policy.
    pub fn new(mode: PoolMode) -> Self {
        let backend: Box<dyn PoolBackend> = match mode {
            PoolMode::Fixed => Box::new(FixedPool::new()),
            PoolMode::Cached => Box::new(CachedPool::new()),
            PoolMode::Active => Box::new(ActivePool::new()),
        };
        Self { mode, backend }
    }

    /// The policy this pool was built with.
    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    /// Sets the queue capacity. Honored only before `start`.
    pub fn set_task_max_count(&self, max: usize) {
        self.backend.set_task_max_count(max);
    }

    /// Sets the worker ceiling. Cached mode only, before `start`.
    pub fn set_thread_max_count(&self, max: usize) {
        self.backend.set_thread_max_count(max);
    }

    /// Sets the idle reap timeout. Cached mode only, before `start`.
    pub fn set_thread_idle_timeout(&self, timeout: Duration) {
        self.backend.set_thread_idle_timeout(timeout);
    }

    /// Starts `init_threads` workers and begins accepting submissions.
    pub fn start(&self, init_threads: usize) {
        self.backend.start(init_threads);
    }

    /// Number of live workers.
    pub fn thread_count(&self) -> usize {
        self.backend.thread_count()
    }

    /// Submits a callable; the handle becomes ready with its result.
    ///
    /// A refused submission (pool not running, queue overflow) is
    /// logged and yields a handle already ready with `R::default()`,
    /// so this never fails in-band.
    pub fn submit<F, R>(&self, func: F) -> ResultHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + Default + 'static,
    {
        match self.try_submit(func) {
            Ok(handle) => handle,
            Err(err) => {
                error!(mode = %self.mode, "task submission failed: {err}");
                ResultHandle::ready(R::default())
            }
        }
    }

    /// Error-visible variant of [`submit`](Self::submit).
    pub fn try_submit<F, R>(&self, func: F) -> Result<ResultHandle<R>, SubmitError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (slot, handle) = result_channel();
        let task = Task::new(move || slot.fill(func()));
        self.backend.submit(task)?;
        Ok(handle)
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(PoolMode::default())
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("mode", &self.mode)
            .field("thread_count", &self.thread_count())
            .finish()
    }
}
