//! Host timing and scheduling hooks.
//!
//! The drive layer never reads a timer or asks the scheduler directly.
//! The host kernel implements these traits over its own TSC / tick source
//! and task table; tests substitute simulated versions.

use core::num::NonZeroUsize;

/// Monotonic time and thread sleep.
pub trait Clock: Sync {
    /// Monotonic microseconds since an arbitrary origin.
    fn now_us(&self) -> u64;

    /// Suspend the calling thread for at least `us` microseconds.
    fn sleep_us(&self, us: u32);

    /// Wall-clock seconds since the Unix epoch, if a real-time clock exists.
    fn unix_time(&self) -> Option<u64> {
        None
    }
}

/// Identifies the execution context (task, thread) currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(NonZeroUsize);

impl ContextId {
    /// `None` for 0, which is reserved for "no owner".
    pub const fn new(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    pub const fn get(self) -> usize {
        self.0.get()
    }
}

/// Scheduler hook for lock ownership tracking.
pub trait Scheduler: Sync {
    fn current_context(&self) -> ContextId;
}
