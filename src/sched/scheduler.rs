//! The scheduler (`spec.md` §4.2): owns the ready structure and the
//! `Fork`/`Yield`/`Sleep`/`Finish`/`Join` operations.
//!
//! Dispatch itself is delegated to the host OS scheduler (`SPEC_FULL.md`
//! §0) -- `Fork` spawns a genuine `std::thread`. The ready structure here
//! still exists and is still consulted for priority-donation bookkeeping
//! (`notify_priority_changed`), matching `spec.md`'s requirement that the
//! ready structure be notified of priority changes, even though it is no
//! longer the thing deciding which thread the CPU runs next.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use log::trace;

use crate::config::SchedulerKind;

use super::queue::{Fifo, MultiLevel, ReadyQueue};
use super::thread::{SpaceId, Thread, ThreadStatus};

/// Process-wide thread scheduler.
pub struct Scheduler {
    ready: Box<dyn ReadyQueue>,
    forked: AtomicUsize,
}

impl Scheduler {
    /// Creates a scheduler with the ready-structure variant named by
    /// `kind` (`config::KernelConfig::scheduler_kind`).
    pub fn new(kind: SchedulerKind) -> Arc<Self> {
        let ready: Box<dyn ReadyQueue> = match kind {
            SchedulerKind::Fifo => Box::new(Fifo::new()),
            SchedulerKind::MultiLevel => Box::new(MultiLevel::new()),
        };
        Arc::new(Self {
            ready,
            forked: AtomicUsize::new(0),
        })
    }

    /// Wraps the calling OS thread (the process's initial thread) as the
    /// kernel's bootstrap thread, with `SpaceId::MAIN` and no address
    /// space. Must be called once, from that thread, before any other
    /// scheduler operation.
    pub fn bootstrap_main_thread(self: &Arc<Self>) -> Arc<Thread> {
        let main = Arc::new(Thread::new(
            "main".to_string(),
            0,
            false,
            SpaceId::MAIN,
            Arc::downgrade(self),
        ));
        main.bind_to_current_os_thread();
        main.set_status(ThreadStatus::Running);
        main
    }

    /// `Fork`: creates a thread control block, places it on the ready
    /// structure, and spawns the real OS thread that will run `entry`.
    /// `entry` receives the new thread's own control block so it can call
    /// `Thread::finish`/synchronization primitives on itself.
    pub fn fork(
        self: &Arc<Self>,
        name: impl Into<String>,
        priority: u8,
        joinable: bool,
        space_id: SpaceId,
        entry: impl FnOnce(&Arc<Thread>) + Send + 'static,
    ) -> Arc<Thread> {
        let thread = Arc::new(Thread::new(
            name.into(),
            priority,
            joinable,
            space_id,
            Arc::downgrade(self),
        ));
        thread.set_status(ThreadStatus::Ready);
        self.ready.push(thread.clone());
        self.forked.fetch_add(1, Ordering::Relaxed);

        let child = thread.clone();
        let scheduler = self.clone();
        let builder = std::thread::Builder::new().name(format!("sid-{}", space_id.as_u64()));
        builder
            .spawn(move || {
                child.bind_to_current_os_thread();
                scheduler.ready.remove(child.thread_id());
                child.set_status(ThreadStatus::Running);
                entry(&child);
            })
            .expect("failed to spawn kernel thread");

        trace!("forked thread \"{}\" (space {})", thread.name(), space_id.as_u64());
        thread
    }

    /// `Yield`: cooperatively relinquishes the CPU if another thread is
    /// ready. Under real OS scheduling this is a hint, not a guarantee, but
    /// the status bookkeeping still mirrors `spec.md`'s transitions.
    pub fn yield_now(&self, current: &Arc<Thread>) {
        if self.ready.is_empty() {
            return;
        }
        current.set_status(ThreadStatus::Ready);
        std::thread::yield_now();
        current.set_status(ThreadStatus::Running);
    }

    /// `Sleep`: marks `current` blocked. The original's idle-wait-for-
    /// interrupt loop has no counterpart here -- the host OS scheduler
    /// runs some other thread regardless -- so this is purely the status
    /// transition callers rely on for bookkeeping.
    pub fn sleep(&self, current: &Arc<Thread>) {
        current.set_status(ThreadStatus::Blocked);
    }

    /// Number of threads ever forked by this scheduler, for diagnostics.
    pub fn forked_count(&self) -> usize {
        self.forked.load(Ordering::Relaxed)
    }

    /// Ready-structure notification hook used by [`crate::sync::PriorityAgent::set_priority`].
    pub(super) fn notify_priority_changed(&self, id: ThreadId) {
        if let Some(thread) = self.ready.remove(id) {
            self.ready.push(thread);
        }
    }
}
