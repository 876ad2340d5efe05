//! Thread control block (`spec.md` §3 "Thread"), grounded in
//! `original_source/threads/thread.cc` and restyled on the teacher's
//! `ProcessId`/`ProcessState` pair (`kernel/src/kernel/process/mod.rs`).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::ThreadId;

use log::trace;

use crate::sync::PriorityAgent;
use crate::sync::Channel;

use super::scheduler::Scheduler;
use super::table::Table;

/// A process identifier, assigned at thread creation and used as a stable
/// key into the running-process table owned by the memory-management layer
/// (`SPEC_FULL.md` §9: "running processes are indexed by `SpaceId` in a
/// sparse table keyed by integer").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(u64);

impl SpaceId {
    /// The identifier reserved for the kernel's own bootstrap thread, which
    /// never carries a user address space.
    pub const MAIN: SpaceId = SpaceId(0);

    /// Allocates a fresh, process-wide-unique identifier.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SpaceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for diagnostics and as a swap-file naming key.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reconstructs a `SpaceId` from a raw value carried in a syscall
    /// register (`Join(spaceId)`, `spec.md` §4.5). The trap dispatcher is
    /// the only caller that should ever need this -- everywhere else a
    /// `SpaceId` is handed out by `fresh()` and threaded through, never
    /// parsed back out of an integer.
    pub const fn from_raw(value: u64) -> Self {
        SpaceId(value)
    }
}

/// `spec.md` §3: "a status (`JustCreated | Ready | Running | Blocked`)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    JustCreated,
    Ready,
    Running,
    Blocked,
}

/// A single open-file handle: the per-call-to-`Open` state (which sector
/// its header lives at, and the cursor for sequential `Read`/`Write`). The
/// richer, sector-indexed, reference-counted bookkeeping shared by every
/// handle on the same file (`spec.md`'s "open-file entry") lives in `fs`,
/// above this layer; this struct only carries the data `sched` needs to
/// hand a per-thread file descriptor around without depending on `fs`.
pub struct OpenFileHandle {
    pub header_sector: u32,
    pub position: spin::Mutex<u64>,
}

impl OpenFileHandle {
    pub fn new(header_sector: u32) -> Self {
        Self {
            header_sector,
            position: spin::Mutex::new(0),
        }
    }
}

/// A kernel thread control block.
///
/// Real concurrency is delegated to a genuine `std::thread` (`SPEC_FULL.md`
/// §0); this struct tracks the bookkeeping `spec.md` layers above `sched`
/// still need: status, priority, the per-process open-file table, and the
/// join channel.
pub struct Thread {
    id: OnceLock<ThreadId>,
    name: String,
    status: spin::Mutex<ThreadStatus>,
    priority: AtomicU8,
    joinable: bool,
    join_channel: Option<Channel<i64>>,
    space_id: SpaceId,
    open_files: spin::Mutex<Table<Arc<OpenFileHandle>>>,
    fault_count: AtomicU64,
    held_locks: AtomicU32,
    scheduler: Weak<Scheduler>,
}

impl Thread {
    pub(super) fn new(
        name: String,
        priority: u8,
        joinable: bool,
        space_id: SpaceId,
        scheduler: Weak<Scheduler>,
    ) -> Self {
        let mut open_files = Table::new();
        // fd 0 and 1 are console input/output and are never represented by
        // a `Table` entry (`spec.md` §4.5); reserving the slots keeps
        // `add()` from ever handing either index to a real file.
        open_files.set(0, Arc::new(OpenFileHandle::new(0)));
        open_files.set(1, Arc::new(OpenFileHandle::new(0)));

        Self {
            id: OnceLock::new(),
            name,
            status: spin::Mutex::new(ThreadStatus::JustCreated),
            priority: AtomicU8::new(priority),
            joinable,
            join_channel: joinable.then(Channel::new),
            space_id,
            open_files: spin::Mutex::new(open_files),
            fault_count: AtomicU64::new(0),
            held_locks: AtomicU32::new(0),
            scheduler,
        }
    }

    /// Binds this TCB to the OS thread currently executing. Must be called
    /// exactly once, from within the thread it describes, before any call
    /// that needs `thread_id()`.
    pub(super) fn bind_to_current_os_thread(&self) {
        let _ = self.id.set(std::thread::current().id());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    pub fn status(&self) -> ThreadStatus {
        *self.status.lock()
    }

    pub(super) fn set_status(&self, status: ThreadStatus) {
        *self.status.lock() = status;
    }

    pub fn is_joinable(&self) -> bool {
        self.joinable
    }

    pub fn priority(&self) -> u8 {
        self.priority.load(Ordering::SeqCst)
    }

    /// Per-thread open-file table (`spec.md` §3).
    pub fn open_files(&self) -> &spin::Mutex<Table<Arc<OpenFileHandle>>> {
        &self.open_files
    }

    /// Round-robin TLB-victim counter (`spec.md` §4.3 step 3).
    pub fn next_fault_slot(&self, tlb_size: usize) -> usize {
        let count = self.fault_count.fetch_add(1, Ordering::Relaxed);
        (count as usize) % tlb_size
    }

    /// `Thread::Finish`: sends the exit status on the join channel (if
    /// joinable) and marks the thread permanently blocked. The forked
    /// closure returns immediately after, so the underlying OS thread
    /// simply ends -- there is no manual stack deallocation to perform,
    /// unlike the original (`SPEC_FULL.md` §0).
    pub fn finish(self: &Arc<Self>, status: i64) {
        debug_assert_eq!(
            self.held_locks.load(Ordering::SeqCst),
            0,
            "thread \"{}\" finished while still holding a lock",
            self.name
        );

        self.set_status(ThreadStatus::Blocked);
        if let Some(channel) = &self.join_channel {
            let agent: Arc<dyn PriorityAgent> = self.clone();
            channel
                .send(&agent, status)
                .expect("join channel send should not fail on a fresh channel");
        }
        trace!("thread \"{}\" finished with status {status}", self.name);
    }

    /// `Join`: blocks until the target thread calls `Finish`, returning its
    /// status. Asserts the target was created joinable.
    pub fn join(&self, caller: &Arc<dyn PriorityAgent>) -> i64 {
        let channel = self
            .join_channel
            .as_ref()
            .expect("Join called on a non-joinable thread");
        channel
            .receive(caller)
            .expect("join channel receive should not fail on a live channel")
    }
}

impl PriorityAgent for Thread {
    fn thread_id(&self) -> ThreadId {
        *self
            .id
            .get()
            .expect("thread_id() called before bind_to_current_os_thread()")
    }

    fn priority(&self) -> u8 {
        Thread::priority(self)
    }

    fn set_priority(&self, priority: u8) {
        self.priority.store(priority, Ordering::SeqCst);
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.notify_priority_changed(self.thread_id());
        }
    }

    fn note_lock_acquired(&self) {
        self.held_locks.fetch_add(1, Ordering::SeqCst);
    }

    fn note_lock_released(&self) {
        self.held_locks.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        trace!("dropping thread control block \"{}\"", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerKind;

    #[test]
    fn space_id_fresh_values_are_never_main_and_never_repeat() {
        let a = SpaceId::fresh();
        let b = SpaceId::fresh();
        assert_ne!(a, SpaceId::MAIN);
        assert_ne!(a, b);
    }

    #[test]
    fn space_id_from_raw_round_trips_as_u64() {
        let id = SpaceId::from_raw(7);
        assert_eq!(id.as_u64(), 7);
    }

    #[test]
    fn fds_0_and_1_are_reserved_on_a_fresh_thread() {
        let scheduler = Scheduler::new(SchedulerKind::Fifo);
        let main = scheduler.bootstrap_main_thread();
        let files = main.open_files().lock();
        assert!(files.get(0).is_some());
        assert!(files.get(1).is_some());
    }

    #[test]
    fn next_fault_slot_round_robins_over_the_tlb_size() {
        let scheduler = Scheduler::new(SchedulerKind::Fifo);
        let main = scheduler.bootstrap_main_thread();
        let slots: Vec<usize> = (0..5).map(|_| main.next_fault_slot(4)).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn priority_can_be_read_and_set_through_the_priority_agent_trait() {
        let scheduler = Scheduler::new(SchedulerKind::Fifo);
        let main = scheduler.bootstrap_main_thread();
        assert_eq!(main.priority(), 0);
        let agent: &dyn PriorityAgent = &*main;
        agent.set_priority(9);
        assert_eq!(main.priority(), 9);
    }

    #[test]
    fn note_lock_acquired_and_released_are_balanced_before_finish() {
        let scheduler = Scheduler::new(SchedulerKind::Fifo);
        let child = scheduler.fork("locker", 1, true, SpaceId::fresh(), |me| {
            let agent: &dyn PriorityAgent = &**me;
            agent.note_lock_acquired();
            agent.note_lock_released();
            me.finish(0);
        });
        let main: Arc<dyn PriorityAgent> = scheduler.bootstrap_main_thread();
        assert_eq!(child.join(&main), 0);
    }
}
