//! FIFO waiter queue shared by the blocking primitives in this module.
//!
//! Suspension is real OS-thread parking (`std::thread::park`); the queue
//! only decides *order*, giving the FIFO guarantee `spec.md` §5 requires
//! without depending on the host OS scheduler being fair.

use std::collections::VecDeque;
use std::thread::{self, Thread};

/// A FIFO queue of parked threads, protected by a `spin::Mutex` -- this
/// crate's analogue of bracketing a critical region with interrupts
/// disabled (`spec.md` §4.1).
#[derive(Default)]
pub struct WaiterQueue {
    waiters: spin::Mutex<VecDeque<Thread>>,
}

impl WaiterQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            waiters: spin::Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueues the calling thread and parks it. Returns once some other
    /// thread has popped this thread off the queue and called `unpark` via
    /// [`WaiterQueue::wake_one`] or [`WaiterQueue::wake_all`].
    ///
    /// Because `std::thread::park` consumes a stored "permit" that
    /// `unpark` may have deposited *before* this call, there is no lost-
    /// wakeup window between enqueuing and parking.
    pub fn park_self(&self) {
        self.enqueue_self();
        thread::park();
    }

    /// Enqueues the calling thread without parking it. Split out of
    /// `park_self` so a caller that must decide-then-enqueue atomically
    /// with some other lock (`Semaphore::p`'s `count == 0` check) can hold
    /// that lock across the enqueue and only park after releasing it.
    pub fn enqueue_self(&self) {
        self.waiters.lock().push_back(thread::current());
    }

    /// Wakes the head of the queue, if any. Returns whether a waiter was
    /// woken.
    pub fn wake_one(&self) -> bool {
        let head = self.waiters.lock().pop_front();
        match head {
            Some(t) => {
                t.unpark();
                true
            }
            None => false,
        }
    }

    /// Wakes every thread queued at the moment of the call (Mesa-style
    /// broadcast; a thread enqueued by a racing `park_self` after this
    /// call returns is not woken by it).
    pub fn wake_all(&self) {
        let mut queue = self.waiters.lock();
        for t in queue.drain(..) {
            t.unpark();
        }
    }

    /// Number of threads currently queued.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether the queue holds no waiters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
