//! taskpool - in-process task execution pools on OS threads.
//!
//! Client threads submit short-lived callables and get back a
//! [`ResultHandle`] that becomes ready once a worker has run the task.
//! Three scheduling policies are available behind the [`ThreadPool`]
//! facade:
//!
//! - **Fixed**: a constant worker count draining one shared queue.
//! - **Cached**: like fixed, but the pool grows under load and reaps
//!   workers that idle past a timeout.
//! - **Active**: no shared queue; each worker owns a public/private
//!   queue pair and submissions target the least-loaded worker.
//!
//! # Example
//!
//! ```ignore
//! use taskpool::{PoolMode, ThreadPool};
//!
//! let pool = ThreadPool::new(PoolMode::Fixed);
//! pool.start(4);
//!
//! let handles: Vec<_> = (0..8u64).map(|i| pool.submit(move || i * i)).collect();
//! let squares: Vec<u64> = handles.into_iter().map(|h| h.wait()).collect();
//! ```
//!
//! Dropping a pool shuts it down cooperatively: accepted tasks are
//! drained, workers retire, and the drop blocks until the last worker
//! has exited.

pub mod error;
pub mod pool;
pub mod spinlock;
pub mod state;
pub mod task;

mod worker;

pub use error::SubmitError;
pub use pool::{ActivePool, CachedPool, FixedPool, PoolConfig, PoolMode, ThreadPool};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use state::PoolState;
pub use task::{result_channel, ResultHandle, ResultSlot, Task};

/// Version of the taskpool library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
