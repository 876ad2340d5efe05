//! `spec.md` §4.1 lock: a mutex built on a semaphore, with optional
//! priority donation when the caller's scheduler uses multi-level
//! priority queues.
//!
//! The synchronization layer must stay below the scheduler/thread layer
//! (`spec.md` §2), yet priority donation needs to read and mutate the
//! *holder's* scheduling priority. This crate resolves that with
//! dependency inversion: callers identify themselves through the
//! [`PriorityAgent`] trait rather than `Lock` reaching upward into
//! `crate::sched` directly -- `sched::Thread` is the concrete
//! implementation callers pass in.

use std::sync::Arc;
use std::thread::ThreadId;

use super::{Semaphore, SyncError};

/// Whatever the caller uses to identify itself and (optionally) have its
/// scheduling priority raised/lowered for the duration of a critical
/// section.
pub trait PriorityAgent: Send + Sync {
    /// Stable identity used for `IsHeldByCurrentThread`-style checks.
    fn thread_id(&self) -> ThreadId;

    /// Current scheduling priority.
    fn priority(&self) -> u8;

    /// Sets the scheduling priority, notifying the ready structure of the
    /// change (`spec.md` §4.1: "The scheduler's ready structure must be
    /// notified of priority changes").
    fn set_priority(&self, priority: u8);

    /// Called when a `Lock::acquire` on behalf of this agent succeeds.
    /// Default no-op; `sched::Thread` uses this to track whether it is
    /// safe to `Finish`.
    fn note_lock_acquired(&self) {}

    /// Called when a `Lock::release` on behalf of this agent succeeds.
    fn note_lock_released(&self) {}
}

struct Holder {
    id: ThreadId,
    agent: Arc<dyn PriorityAgent>,
}

/// A mutex, optionally donation-aware.
pub struct Lock {
    sem: Semaphore,
    holder: spin::Mutex<Option<Holder>>,
    /// Holder's priority before the single most recent donation, restored
    /// on the matching `Release`. Mirrors the original's one-slot
    /// `oldPriority` field on `Lock` rather than a stack of donations.
    saved_priority: spin::Mutex<Option<u8>>,
    donation_enabled: bool,
}

impl Lock {
    /// Creates an unheld lock. `donation_enabled` should mirror whether the
    /// owning kernel's scheduler uses multi-level priority queues
    /// (`spec.md` §4.1, §4.2).
    pub fn new(donation_enabled: bool) -> Self {
        Self {
            sem: Semaphore::new(1),
            holder: spin::Mutex::new(None),
            saved_priority: spin::Mutex::new(None),
            donation_enabled,
        }
    }

    /// `Acquire`: asserts the caller doesn't already hold the lock, waits
    /// for it, then (if donation is enabled and the incoming holder has
    /// lower priority than the caller) raises the holder's priority to the
    /// caller's for the duration of the section.
    pub fn acquire(&self, caller: &Arc<dyn PriorityAgent>) -> Result<(), SyncError> {
        if self.is_held_by(caller.thread_id()) {
            return Err(SyncError::AlreadyHeld);
        }

        if self.donation_enabled {
            if let Some(h) = self.holder.lock().as_ref() {
                let owner_priority = h.agent.priority();
                let caller_priority = caller.priority();
                if owner_priority < caller_priority {
                    *self.saved_priority.lock() = Some(owner_priority);
                    h.agent.set_priority(caller_priority);
                }
            }
        }

        self.sem.p();

        *self.holder.lock() = Some(Holder {
            id: caller.thread_id(),
            agent: caller.clone(),
        });
        caller.note_lock_acquired();
        Ok(())
    }

    /// `Release`: asserts the caller is the current holder, restores any
    /// priority donated to it while it held the lock, clears the holder,
    /// then signals the semaphore.
    pub fn release(&self, caller: &Arc<dyn PriorityAgent>) -> Result<(), SyncError> {
        if !self.is_held_by(caller.thread_id()) {
            return Err(SyncError::NotHeldByCaller);
        }

        if self.donation_enabled {
            if let Some(original) = self.saved_priority.lock().take() {
                if caller.priority() != original {
                    caller.set_priority(original);
                }
            }
        }

        *self.holder.lock() = None;
        self.sem.v();
        caller.note_lock_released();
        Ok(())
    }

    /// `IsHeldByCurrentThread`.
    pub fn is_held_by(&self, id: ThreadId) -> bool {
        self.holder.lock().as_ref().map(|h| h.id) == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    struct TestAgent {
        id: ThreadId,
        priority: AtomicU8,
    }

    impl PriorityAgent for TestAgent {
        fn thread_id(&self) -> ThreadId {
            self.id
        }
        fn priority(&self) -> u8 {
            self.priority.load(Ordering::SeqCst)
        }
        fn set_priority(&self, priority: u8) {
            self.priority.store(priority, Ordering::SeqCst);
        }
    }

    fn agent(priority: u8) -> Arc<dyn PriorityAgent> {
        Arc::new(TestAgent {
            id: std::thread::current().id(),
            priority: AtomicU8::new(priority),
        })
    }

    #[test]
    fn acquire_release_round_trip() {
        let lock = Lock::new(false);
        let a = agent(1);
        lock.acquire(&a).unwrap();
        assert!(lock.is_held_by(a.thread_id()));
        lock.release(&a).unwrap();
        assert!(!lock.is_held_by(a.thread_id()));
    }

    #[test]
    fn double_acquire_by_holder_errors() {
        let lock = Lock::new(false);
        let a = agent(1);
        lock.acquire(&a).unwrap();
        assert_eq!(lock.acquire(&a).unwrap_err(), SyncError::AlreadyHeld);
    }

    #[test]
    fn release_by_non_holder_errors() {
        let lock = Arc::new(Lock::new(false));
        let a = agent(1);
        lock.acquire(&a).unwrap();

        let lock2 = lock.clone();
        std::thread::spawn(move || {
            let b = agent(1);
            assert_eq!(lock2.release(&b).unwrap_err(), SyncError::NotHeldByCaller);
        })
        .join()
        .unwrap();
    }

    /// S6: priority donation round trip (`spec.md` §8).
    #[test]
    fn priority_donation_round_trips() {
        let lock = Arc::new(Lock::new(true));
        let low = agent(1);
        lock.acquire(&low).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let lock2 = lock.clone();
        let barrier2 = barrier.clone();
        let handle = std::thread::spawn(move || {
            let high = agent(9);
            barrier2.wait();
            lock2.acquire(&high).unwrap();
            lock2.release(&high).unwrap();
        });

        barrier.wait();
        // Give the high-priority thread time to block on Acquire and
        // donate.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(low.priority(), 9);

        lock.release(&low).unwrap();
        assert_eq!(low.priority(), 1);

        handle.join().unwrap();
    }
}
