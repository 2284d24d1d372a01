//! Worker identity and thread startup.
//!
//! A [`Worker`] is a logical pool thread: an integer identity drawn
//! from a process-wide counter plus a detached OS thread running the
//! pool's loop. No join handle is kept; retirement is coordinated
//! through pool state and condition variables.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Process-wide source of worker identities. Never reset, so ids stay
/// unique across pool instances.
static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn next_worker_id() -> usize {
    NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A logical pool thread with a stable integer identity.
pub(crate) struct Worker {
    id: usize,
}

impl Worker {
    /// Allocates an identity. The thread itself starts in
    /// [`start`](Self::start), after the pool has recorded the worker.
    pub(crate) fn new() -> Self {
        Self {
            id: next_worker_id(),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Spawns the detached OS thread running `func(id)`.
    pub(crate) fn start<F>(&self, func: F)
    where
        F: FnOnce(usize) + Send + 'static,
    {
        let id = self.id;
        thread::Builder::new()
            .name(format!("pool-worker-{id}"))
            .spawn(move || func(id))
            .expect("failed to spawn pool worker thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_ids_are_monotonic() {
        let a = Worker::new();
        let b = Worker::new();
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_start_runs_func_with_own_id() {
        let worker = Worker::new();
        let expected = worker.id();
        let (tx, rx) = mpsc::channel();
        worker.start(move |id| tx.send(id).unwrap());
        assert_eq!(rx.recv().unwrap(), expected);
    }
}
