//! Pool lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a pool.
///
/// Transitions run strictly `Init -> Running -> Exiting`; there is no
/// way back. Setters are honored only in `Init`, submissions only in
/// `Running`, and workers retire once they observe `Exiting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    /// Created but not started; configuration is still writable.
    Init = 0,
    /// Accepting and executing submissions.
    Running = 1,
    /// Shutting down; workers drain their queues and retire.
    Exiting = 2,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Running,
            _ => Self::Exiting,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Running => write!(f, "Running"),
            Self::Exiting => write!(f, "Exiting"),
        }
    }
}

/// Atomic cell holding a [`PoolState`].
pub(crate) struct AtomicPoolState(AtomicU8);

impl AtomicPoolState {
    pub(crate) const fn new(state: PoolState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> PoolState {
        PoolState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: PoolState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Attempts the `current -> next` transition; returns whether this
    /// caller won it.
    pub(crate) fn transition(&self, current: PoolState, next: PoolState) -> bool {
        self.0
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
