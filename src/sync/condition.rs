//! `spec.md` §4.1 condition variable: Mesa-style, bound to a caller-supplied
//! lock rather than owning one itself.

use std::sync::Arc;

use super::lock::PriorityAgent;
use super::{Lock, Semaphore, SyncError};

/// A Mesa-style condition variable.
///
/// Unlike a Hoare monitor, a thread woken by `Signal`/`Broadcast` does not
/// run immediately -- it re-enters the ready queue and must re-acquire the
/// lock like any other contender, so callers must re-check their wait
/// condition in a loop. Each waiter parks on its own private semaphore
/// rather than sharing one, so `Signal` can wake exactly one waiter without
/// racing a second one awake alongside it.
pub struct Condition {
    waiters: spin::Mutex<Vec<Arc<Semaphore>>>,
}

impl Condition {
    /// Creates a condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: spin::Mutex::new(Vec::new()),
        }
    }

    /// `Wait`: the caller must hold `lock`. Enqueues a fresh semaphore,
    /// releases `lock`, blocks on that semaphore, then re-acquires `lock`
    /// before returning.
    pub fn wait(&self, lock: &Lock, caller: &Arc<dyn PriorityAgent>) -> Result<(), SyncError> {
        if !lock.is_held_by(caller.thread_id()) {
            return Err(SyncError::NotHeldByCaller);
        }

        let waiter = Arc::new(Semaphore::new(0));
        self.waiters.lock().push(waiter.clone());

        lock.release(caller)?;
        waiter.p();
        lock.acquire(caller)
    }

    /// `Signal`: the caller must hold `lock`. Wakes the longest-waiting
    /// thread, if any. A no-op when nobody is waiting.
    pub fn signal(&self, lock: &Lock, caller: &Arc<dyn PriorityAgent>) -> Result<(), SyncError> {
        if !lock.is_held_by(caller.thread_id()) {
            return Err(SyncError::NotHeldByCaller);
        }

        let next = {
            let mut waiters = self.waiters.lock();
            if waiters.is_empty() {
                None
            } else {
                Some(waiters.remove(0))
            }
        };
        if let Some(waiter) = next {
            waiter.v();
        }
        Ok(())
    }

    /// `Broadcast`: the caller must hold `lock`. Wakes every thread waiting
    /// at the moment of the call.
    ///
    /// Open question resolved (`SPEC_FULL.md` §9): a thread that calls
    /// `Wait` concurrently with a `Broadcast` in flight is not guaranteed to
    /// be among those woken, matching the original's behavior of draining
    /// exactly the queue snapshot taken at entry.
    pub fn broadcast(&self, lock: &Lock, caller: &Arc<dyn PriorityAgent>) -> Result<(), SyncError> {
        if !lock.is_held_by(caller.thread_id()) {
            return Err(SyncError::NotHeldByCaller);
        }

        let drained: Vec<_> = self.waiters.lock().drain(..).collect();
        for waiter in drained {
            waiter.v();
        }
        Ok(())
    }

    /// Number of threads currently parked in `Wait`, for diagnostics/tests.
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}
