//! Pool configuration and defaults.

use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Default number of workers created by `start`.
pub const DEFAULT_INIT_THREAD_COUNT: usize = 4;

/// Default shared-queue capacity for the fixed and cached pools.
pub const DEFAULT_TASK_MAX_COUNT: usize = 1_000_001;

/// Default worker ceiling for the cached pool.
pub const DEFAULT_THREAD_MAX_COUNT: usize = 16;

/// Default idle time after which a cached-pool worker above the
/// initial count retires.
pub const DEFAULT_THREAD_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default per-worker public-queue capacity for the active pool.
pub const DEFAULT_ACTIVE_TASK_MAX_COUNT: usize = 500_001;

/// Worker ceiling for the active pool.
pub const ACTIVE_THREAD_MAX_COUNT: usize = 32;

// =============================================================================
// Timing
// =============================================================================

/// How long a submitter waits for shared-queue space before the
/// submission fails with an overflow.
pub const SUBMIT_WAIT: Duration = Duration::from_secs(1);

/// Back-off before the active pool's single dispatch retry.
pub const SUBMIT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Wake-up interval for cached-pool workers checking their idle time.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration
// =============================================================================

/// Knobs shared by the pool policies.
///
/// Which fields apply depends on the policy: the fixed pool reads only
/// `task_max_count`, the cached pool reads all three, and the active
/// pool reads `task_max_count` as a per-worker cap.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Soft capacity of the shared queue (per worker in active mode).
    pub task_max_count: usize,
    /// Worker ceiling (cached mode).
    pub thread_max_count: usize,
    /// Idle time after which an extra worker retires (cached mode).
    pub thread_idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            task_max_count: DEFAULT_TASK_MAX_COUNT,
            thread_max_count: DEFAULT_THREAD_MAX_COUNT,
            thread_idle_timeout: DEFAULT_THREAD_IDLE_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Defaults used by the active pool: a per-worker cap and a larger
    /// worker ceiling.
    pub fn active() -> Self {
        Self {
            task_max_count: DEFAULT_ACTIVE_TASK_MAX_COUNT,
            thread_max_count: ACTIVE_THREAD_MAX_COUNT,
            thread_idle_timeout: DEFAULT_THREAD_IDLE_TIMEOUT,
        }
    }

    /// Sets the queue capacity.
    pub fn with_task_max_count(mut self, max: usize) -> Self {
        self.task_max_count = max;
        self
    }

    /// Sets the worker ceiling.
    pub fn with_thread_max_count(mut self, max: usize) -> Self {
        self.thread_max_count = max;
        self
    }

    /// Sets the idle reap timeout.
    pub fn with_thread_idle_timeout(mut self, timeout: Duration) -> Self {
        self.thread_idle_timeout = timeout;
        self
    }
}
