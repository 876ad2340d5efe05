//! `spec.md` §4.1 semaphore: a non-negative counter plus a FIFO waiter
//! queue. Never fails (infallible per the spec).

use super::waiter::WaiterQueue;

struct State {
    count: u32,
}

/// A counting semaphore.
pub struct Semaphore {
    state: spin::Mutex<State>,
    waiters: WaiterQueue,
}

impl Semaphore {
    /// Creates a semaphore with the given initial counter value.
    pub const fn new(initial: u32) -> Self {
        Self {
            state: spin::Mutex::new(State { count: initial }),
            waiters: WaiterQueue::new(),
        }
    }

    /// `P` (wait): decrements the counter if positive; otherwise suspends
    /// the caller until a matching `V` wakes it.
    pub fn p(&self) {
        let mut state = self.state.lock();
        if state.count > 0 {
            state.count -= 1;
            return;
        }
        // Counter is zero: join the FIFO waiter queue while still holding
        // `state`'s lock, so the count==0 observation and the enqueue are
        // atomic with respect to a racing `v()`. Enqueuing after dropping
        // the lock would leave a window where `v()` finds the queue empty,
        // bumps `count` instead of targeting us, and we then park with no
        // permit ever delivered to us specifically.
        self.waiters.enqueue_self();
        drop(state);
        std::thread::park();
    }

    /// `V` (signal): wakes the head of the waiter queue, or increments the
    /// counter if nobody is waiting.
    pub fn v(&self) {
        if self.waiters.wake_one() {
            return;
        }
        self.state.lock().count += 1;
    }

    /// Current counter value, for diagnostics/tests only.
    pub fn count(&self) -> u32 {
        self.state.lock().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn p_does_not_block_when_counter_positive() {
        let sem = Semaphore::new(1);
        sem.p();
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn v_wakes_a_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let woken = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let sem2 = sem.clone();
        let woken2 = woken.clone();
        let handle = std::thread::spawn(move || {
            sem2.p();
            woken2.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        // Give the waiter a chance to park before signalling.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!woken.load(std::sync::atomic::Ordering::SeqCst));

        sem.v();
        handle.join().unwrap();
        assert!(woken.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn v_increments_counter_when_no_waiters() {
        let sem = Semaphore::new(0);
        sem.v();
        assert_eq!(sem.count(), 1);
    }
}
