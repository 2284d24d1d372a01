//! Work items and one-shot result delivery.
//!
//! A [`Task`] is the opaque unit the pools move around: a boxed
//! callable that some worker runs exactly once. The facade pairs each
//! task with a [`ResultSlot`] so the submitter's [`ResultHandle`]
//! becomes ready when the body returns.
//!
//! A slot dropped without being filled (a task discarded during
//! shutdown, or a body that panicked) marks the handle abandoned;
//! waiting on an abandoned handle yields `R::default()` instead of
//! blocking forever.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::error;

/// An opaque, run-once work item.
pub struct Task(Box<dyn FnOnce() + Send + 'static>);

impl Task {
    /// Wraps a callable into a work item.
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(body))
    }

    /// Runs the body exactly once.
    ///
    /// A panicking body is contained here so the worker that ran it
    /// stays alive. The body's result slot unwinds with it and leaves
    /// the submitter's handle abandoned.
    pub(crate) fn run(self) {
        if panic::catch_unwind(AssertUnwindSafe(self.0)).is_err() {
            error!("task body panicked; worker continues");
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

enum SlotState<R> {
    Pending,
    Ready(R),
    Abandoned,
}

struct Channel<R> {
    slot: Mutex<SlotState<R>>,
    ready: Condvar,
}

/// Creates a connected producer/consumer pair for one result.
pub fn result_channel<R>() -> (ResultSlot<R>, ResultHandle<R>) {
    let chan = Arc::new(Channel {
        slot: Mutex::new(SlotState::Pending),
        ready: Condvar::new(),
    });
    (
        ResultSlot {
            chan: Arc::clone(&chan),
        },
        ResultHandle { chan },
    )
}

/// Submitter-visible carrier of a task's eventual return value.
///
/// One-shot: [`wait`](Self::wait) consumes the handle.
pub struct ResultHandle<R> {
    chan: Arc<Channel<R>>,
}

impl<R> ResultHandle<R> {
    /// A handle that is already ready with `value`.
    pub fn ready(value: R) -> Self {
        Self {
            chan: Arc::new(Channel {
                slot: Mutex::new(SlotState::Ready(value)),
                ready: Condvar::new(),
            }),
        }
    }

    /// Returns whether a value (or abandonment) has been published.
    pub fn is_ready(&self) -> bool {
        !matches!(*self.chan.slot.lock().unwrap(), SlotState::Pending)
    }
}

impl<R: Default> ResultHandle<R> {
    /// Blocks until the result is published and returns it.
    ///
    /// Yields `R::default()` if the producing task was dropped without
    /// completing.
    pub fn wait(self) -> R {
        let slot = self.chan.slot.lock().unwrap();
        let mut slot = self
            .chan
            .ready
            .wait_while(slot, |slot| matches!(slot, SlotState::Pending))
            .unwrap();
        match std::mem::replace(&mut *slot, SlotState::Abandoned) {
            SlotState::Ready(value) => value,
            _ => R::default(),
        }
    }

    /// Blocks up to `timeout`; hands the handle back on expiry.
    pub fn wait_timeout(self, timeout: Duration) -> Result<R, Self> {
        let slot = self.chan.slot.lock().unwrap();
        let (mut slot, result) = self
            .chan
            .ready
            .wait_timeout_while(slot, timeout, |slot| matches!(slot, SlotState::Pending))
            .unwrap();
        if result.timed_out() && matches!(*slot, SlotState::Pending) {
            drop(slot);
            return Err(self);
        }
        match std::mem::replace(&mut *slot, SlotState::Abandoned) {
            SlotState::Ready(value) => Ok(value),
            _ => Ok(R::default()),
        }
    }
}

impl<R> fmt::Debug for ResultHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Producer half of the result channel, captured inside the task body.
pub struct ResultSlot<R> {
    chan: Arc<Channel<R>>,
}

impl<R> ResultSlot<R> {
    /// Publishes the value and wakes the waiting submitter.
    pub fn fill(self, value: R) {
        let mut slot = self.chan.slot.lock().unwrap();
        *slot = SlotState::Ready(value);
        self.chan.ready.notify_all();
    }
}

impl<R> Drop for ResultSlot<R> {
    fn drop(&mut self) {
        let mut slot = self.chan.slot.lock().unwrap();
        if matches!(*slot, SlotState::Pending) {
            *slot = SlotState::Abandoned;
            self.chan.ready.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_fill_then_wait() {
        let (slot, handle) = result_channel();
        slot.fill(7usize);
        assert!(handle.is_ready());
        assert_eq!(handle.wait(), 7);
    }

    #[test]
    fn test_wait_blocks_until_filled() {
        let (slot, handle) = result_channel();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            slot.fill(13u32);
        });
        assert_eq!(handle.wait(), 13);
        producer.join().unwrap();
    }

    #[test]
    fn test_dropped_slot_yields_default() {
        let (slot, handle) = result_channel::<u64>();
        drop(slot);
        assert!(handle.is_ready());
        assert_eq!(handle.wait(), 0);
    }

    #[test]
    fn test_ready_handle() {
        let handle = ResultHandle::ready(String::from("done"));
        assert!(handle.is_ready());
        assert_eq!(handle.wait(), "done");
    }

    #[test]
    fn test_wait_timeout_returns_handle_on_expiry() {
        let (slot, handle) = result_channel::<i32>();
        let handle = match handle.wait_timeout(Duration::from_millis(20)) {
            Err(handle) => handle,
            Ok(_) => panic!("result appeared without a producer"),
        };
        slot.fill(-5);
        match handle.wait_timeout(Duration::from_secs(1)) {
            Ok(value) => assert_eq!(value, -5),
            Err(_) => panic!("result not ready after fill"),
        }
    }

    #[test]
    fn test_panicking_body_is_contained() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_task = Arc::clone(&ran);
        let task = Task::new(move || {
            ran_in_task.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        });
        task.run();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_body_abandons_its_slot() {
        let (slot, handle) = result_channel::<usize>();
        let task = Task::new(move || {
            let _slot = slot;
            panic!("boom");
        });
        task.run();
        assert_eq!(handle.wait(), 0);
    }
}
