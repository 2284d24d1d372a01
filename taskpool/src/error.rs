//! Submission error tokens.

use thiserror::Error;

/// Reasons a pool can refuse a task submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The pool is not in the running state.
    #[error("pool is not running")]
    PoolNotRunning,

    /// The task queue stayed full past the allowed wait.
    #[error("task queue overflow")]
    TaskQueueOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(SubmitError::PoolNotRunning.to_string(), "pool is not running");
        assert_eq!(
            SubmitError::TaskQueueOverflow.to_string(),
            "task queue overflow"
        );
    }
}
