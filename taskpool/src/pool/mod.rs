//! Task execution pool policies.
//!
//! Three interchangeable scheduling policies sit behind one facade:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ThreadPool (facade)                  │
//! │      typed submit -> Task + ResultHandle             │
//! ├──────────────┬────────────────────┬──────────────────┤
//! │  FixedPool   │     CachedPool     │    ActivePool    │
//! │ shared queue │    shared queue    │ per-worker dual  │
//! │ fixed count  │ elastic count with │ queues, least-   │
//! │              │   idle reaping     │ loaded dispatch  │
//! └──────────────┴────────────────────┴──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use taskpool::{PoolMode, ThreadPool};
//!
//! let pool = ThreadPool::new(PoolMode::Cached);
//! pool.start(4);
//!
//! let handle = pool.submit(|| 2 + 2);
//! assert_eq!(handle.wait(), 4);
//! ```

pub mod active;
pub mod cached;
pub mod config;
pub mod facade;
pub mod fixed;

pub use active::ActivePool;
pub use cached::CachedPool;
pub use config::{
    PoolConfig, ACTIVE_THREAD_MAX_COUNT, DEFAULT_ACTIVE_TASK_MAX_COUNT, DEFAULT_INIT_THREAD_COUNT,
    DEFAULT_TASK_MAX_COUNT, DEFAULT_THREAD_IDLE_TIMEOUT, DEFAULT_THREAD_MAX_COUNT,
};
pub use facade::{PoolMode, ThreadPool};
pub use fixed::FixedPool;

use std::time::Duration;

use tracing::warn;

use crate::error::SubmitError;
use crate::task::Task;

/// The seam between the facade and the policy implementations.
///
/// Setters default to a logged refusal; each policy overrides only the
/// knobs it supports.
pub(crate) trait PoolBackend: Send + Sync {
    fn set_task_max_count(&self, _max: usize) {
        warn!("set_task_max_count: unsupported operation for this pool mode");
    }

    fn set_thread_max_count(&self, _max: usize) {
        warn!("set_thread_max_count: unsupported operation for this pool mode");
    }

    fn set_thread_idle_timeout(&self, _timeout: Duration) {
        warn!("set_thread_idle_timeout: unsupported operation for this pool mode");
    }

    fn start(&self, init_threads: usize);

    fn submit(&self, task: Task) -> Result<(), SubmitError>;

    fn thread_count(&self) -> usize;
}

impl PoolBackend for FixedPool {
    fn set_task_max_count(&self, max: usize) {
        FixedPool::set_task_max_count(self, max);
    }

    fn start(&self, init_threads: usize) {
        FixedPool::start(self, init_threads);
    }

    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        FixedPool::submit(self, task)
    }

    fn thread_count(&self) -> usize {
        self.cur_thread_count()
    }
}

impl PoolBackend for CachedPool {
    fn set_task_max_count(&self, max: usize) {
        CachedPool::set_task_max_count(self, max);
    }

    fn set_thread_max_count(&self, max: usize) {
        CachedPool::set_thread_max_count(self, max);
    }

    fn set_thread_idle_timeout(&self, timeout: Duration) {
        CachedPool::set_thread_idle_timeout(self, timeout);
    }

    fn start(&self, init_threads: usize) {
        CachedPool::start(self, init_threads);
    }

    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        CachedPool::submit(self, task)
    }

    fn thread_count(&self) -> usize {
        self.cur_thread_count()
    }
}

impl PoolBackend for ActivePool {
    fn set_task_max_count(&self, max: usize) {
        ActivePool::set_task_max_count(self, max);
    }

    fn start(&self, init_threads: usize) {
        ActivePool::start(self, init_threads);
    }

    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        ActivePool::submit(self, task)
    }

    fn thread_count(&self) -> usize {
        self.cur_thread_count()
    }
}
