//! Synchronization primitives (`spec.md` §4.1): semaphores, locks with
//! optional priority donation, Mesa-style condition variables, and
//! rendezvous channels.
//!
//! This is the leaf layer -- it depends on nothing above it. Per
//! `SPEC_FULL.md` §0, the "disable interrupts" atomic the original builds
//! on is realized here as a `spin::Mutex` guarding each primitive's waiter
//! queue, and actual suspension is real OS-thread parking rather than a
//! cooperative scheduler switch.

mod channel;
mod condition;
mod lock;
mod semaphore;
mod waiter;

pub use channel::Channel;
pub use condition::Condition;
pub use lock::{Lock, PriorityAgent};
pub use semaphore::Semaphore;

use thiserror::Error;

/// Errors raised by the synchronization layer. Per `spec.md` §7 these are
/// assertion-kind: misuse of a primitive by kernel code, never a
/// user-facing failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// `Lock::Acquire` called by a thread that already holds the lock.
    #[error("lock already held by the calling thread")]
    AlreadyHeld,
    /// `Lock::Release` (or `Condition` method) called by a thread that is
    /// not the current holder.
    #[error("lock is not held by the calling thread")]
    NotHeldByCaller,
}
