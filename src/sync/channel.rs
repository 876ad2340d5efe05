//! `spec.md` §4.1 channel: synchronous rendezvous mailbox built on a [`Lock`]
//! and two [`Condition`]s, grounded in the original's `threads/channel.cc`.
//!
//! `Send` does not return until a matching `Receive` has popped the message
//! back out -- the sender waits on `conditionForSenders` after appending,
//! and `Receive` signals it once it has taken the value.

use std::collections::VecDeque;
use std::sync::Arc;

use super::lock::PriorityAgent;
use super::{Condition, Lock, SyncError};

/// A single-message-at-a-time rendezvous channel.
pub struct Channel<T> {
    lock: Lock,
    senders: Condition,
    receivers: Condition,
    mailbox: spin::Mutex<VecDeque<T>>,
}

impl<T> Channel<T> {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self {
            lock: Lock::new(false),
            senders: Condition::new(),
            receivers: Condition::new(),
            mailbox: spin::Mutex::new(VecDeque::new()),
        }
    }

    /// `Send`: appends `message`, wakes a waiting receiver, then blocks
    /// until a `Receive` call has taken it back out.
    pub fn send(&self, caller: &Arc<dyn PriorityAgent>, message: T) -> Result<(), SyncError> {
        self.lock.acquire(caller)?;
        self.mailbox.lock().push_back(message);
        self.receivers.signal(&self.lock, caller)?;
        self.senders.wait(&self.lock, caller)?;
        self.lock.release(caller)?;
        Ok(())
    }

    /// `Receive`: waits for a message if the mailbox is empty, pops it, and
    /// wakes the sender that is waiting on this exact delivery.
    pub fn receive(&self, caller: &Arc<dyn PriorityAgent>) -> Result<T, SyncError> {
        self.lock.acquire(caller)?;
        while self.mailbox.lock().is_empty() {
            self.receivers.wait(&self.lock, caller)?;
        }
        let message = self
            .mailbox
            .lock()
            .pop_front()
            .expect("mailbox non-empty under lock");
        self.senders.signal(&self.lock, caller)?;
        self.lock.release(caller)?;
        Ok(message)
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}
