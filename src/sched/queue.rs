//! Ready-structure variants (`spec.md` §4.2): a plain FIFO queue, or a
//! priority-keyed queue that is FIFO within each priority level.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::sync::PriorityAgent;

use super::thread::Thread;

/// A ready structure: holds threads logically marked `Ready`, in the order
/// they should next be dispatched.
pub trait ReadyQueue: Send + Sync {
    /// Enqueues `thread`, placing it according to the queue's policy.
    fn push(&self, thread: Arc<Thread>);

    /// Removes and returns the next thread to run, if any.
    fn pop(&self) -> Option<Arc<Thread>>;

    /// Removes `id` from wherever it currently sits in the structure, if
    /// present.
    fn remove(&self, id: ThreadId) -> Option<Arc<Thread>>;

    /// Number of threads currently queued.
    fn len(&self) -> usize;

    /// Whether the structure holds no threads.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plain FIFO ready queue.
#[derive(Default)]
pub struct Fifo {
    queue: spin::Mutex<VecDeque<Arc<Thread>>>,
}

impl Fifo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadyQueue for Fifo {
    fn push(&self, thread: Arc<Thread>) {
        self.queue.lock().push_back(thread);
    }

    fn pop(&self) -> Option<Arc<Thread>> {
        self.queue.lock().pop_front()
    }

    fn remove(&self, id: ThreadId) -> Option<Arc<Thread>> {
        let mut queue = self.queue.lock();
        let position = queue.iter().position(|t| t.thread_id() == id)?;
        queue.remove(position)
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Priority-keyed ready queue: higher priority is chosen first, FIFO
/// within a level (`spec.md` §4.2, §5).
#[derive(Default)]
pub struct MultiLevel {
    // Keyed by `u8::MAX - priority` so that ascending iteration (including
    // `BTreeMap::first_key_value`) visits the highest priority first.
    levels: spin::Mutex<BTreeMap<u8, VecDeque<Arc<Thread>>>>,
}

impl MultiLevel {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(priority: u8) -> u8 {
        u8::MAX - priority
    }
}

impl ReadyQueue for MultiLevel {
    fn push(&self, thread: Arc<Thread>) {
        let key = Self::key(thread.priority());
        self.levels.lock().entry(key).or_default().push_back(thread);
    }

    fn pop(&self) -> Option<Arc<Thread>> {
        let mut levels = self.levels.lock();
        let key = *levels.iter().find(|(_, q)| !q.is_empty())?.0;
        let bucket = levels.get_mut(&key)?;
        let thread = bucket.pop_front();
        if bucket.is_empty() {
            levels.remove(&key);
        }
        thread
    }

    fn remove(&self, id: ThreadId) -> Option<Arc<Thread>> {
        let mut levels = self.levels.lock();
        for bucket in levels.values_mut() {
            if let Some(position) = bucket.iter().position(|t| t.thread_id() == id) {
                return bucket.remove(position);
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.levels.lock().values().map(VecDeque::len).sum()
    }
}
