//! The open-file table: per-sector, reference-counted state for every file
//! that has at least one live handle or a pending remove (`spec.md` §3
//! "Open-file entry"), grounded in
//! `examples/original_source/filesys/open_file.cc`'s `openFilesTable`
//! array (there indexed by sector; here a sparse map, since the sector
//! space is far larger than the number of files ever actually opened).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::sched::SpaceId;
use crate::sync::{Channel, Lock};

/// The kernel's per-sector bookkeeping for an open (or being-removed)
/// file. Persists for the kernel's lifetime once created; its locks are
/// logically reclaimed (reset) the next time the sector is reused by
/// `Create` (`spec.md` §3: "the sector-indexed open-file entry persists
/// for the kernel's lifetime but its locks are reclaimed when the last
/// handle closes" -- in practice that reclamation is observed here as
/// `FileSystem::create` resetting the entry before reuse, matching the
/// original's `Create` re-initializing `openFilesTable[sector]`).
pub struct OpenFileEntry {
    open_count: spin::Mutex<u32>,
    removing: spin::Mutex<bool>,
    removed: spin::Mutex<bool>,
    remover: spin::Mutex<Option<SpaceId>>,
    /// Serializes `Write` against other writers on this file
    /// (`spec.md` §4.4 "Read/write").
    pub write_lock: Lock,
    /// Serializes concurrent `Remove` attempts on the same file.
    pub remove_lock: Lock,
    /// Serializes the open-count decrement in `Close`.
    pub close_lock: Lock,
    /// The pending remover blocks on this until `open_count` reaches
    /// zero (`spec.md` §4.4 "Remove").
    remover_channel: Channel<()>,
}

impl OpenFileEntry {
    fn fresh() -> Self {
        Self {
            open_count: spin::Mutex::new(0),
            removing: spin::Mutex::new(false),
            removed: spin::Mutex::new(false),
            remover: spin::Mutex::new(None),
            write_lock: Lock::new(false),
            remove_lock: Lock::new(false),
            close_lock: Lock::new(false),
            remover_channel: Channel::new(),
        }
    }

    /// Resets this entry to a brand-new state, for `Create` reusing a
    /// sector a previously removed file once occupied.
    fn reset(&self) {
        *self.open_count.lock() = 0;
        *self.removing.lock() = false;
        *self.removed.lock() = false;
        *self.remover.lock() = None;
    }

    /// `Open`: refuses while a remove is in flight.
    pub fn is_removing(&self) -> bool {
        *self.removing.lock()
    }

    pub fn is_removed(&self) -> bool {
        *self.removed.lock()
    }

    /// Registers one more live handle on this file.
    pub fn register_open(&self) {
        *self.open_count.lock() += 1;
    }

    /// `Close`: decrements the open count under `close_lock`; if it
    /// reaches zero and a remover is waiting, wakes it.
    pub fn close(&self, caller: &Arc<dyn crate::sync::PriorityAgent>) {
        self.close_lock.acquire(caller).expect("close lock");
        let mut count = self.open_count.lock();
        if *count > 0 {
            *count -= 1;
        }
        let now_zero = *count == 0;
        drop(count);
        if now_zero && self.is_removing() {
            let _ = self.remover_channel.send(caller, ());
        }
        self.close_lock.release(caller).expect("close lock");
    }

    pub fn open_count(&self) -> u32 {
        *self.open_count.lock()
    }

    /// `Remove`'s blocking half: marks the entry removing, records the
    /// caller as the pending remover, and -- if readers/writers are still
    /// attached -- blocks until the last one closes.
    pub fn begin_remove(&self, caller: &Arc<dyn crate::sync::PriorityAgent>, remover: SpaceId) {
        *self.removing.lock() = true;
        *self.remover.lock() = Some(remover);
        if self.open_count() > 0 {
            self.remover_channel
                .receive(caller)
                .expect("remover channel receive");
        }
    }

    pub fn finish_remove(&self) {
        *self.removed.lock() = true;
    }
}

/// Process-wide table of [`OpenFileEntry`]s keyed by header sector
/// (`SPEC_FULL.md` §3: "keyed by header sector number in a process-wide
/// table").
#[derive(Default)]
pub struct OpenFileTable {
    entries: spin::Mutex<BTreeMap<u32, Arc<OpenFileEntry>>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `sector`, lazily creating it on first access
    /// (`spec.md` §4.4: "the kernel's per-sector ... state ... lazily
    /// create the write/remove/close locks on first open").
    pub fn get_or_create(&self, sector: u32) -> Arc<OpenFileEntry> {
        self.entries
            .lock()
            .entry(sector)
            .or_insert_with(|| Arc::new(OpenFileEntry::fresh()))
            .clone()
    }

    /// Resets (or creates) the entry for `sector` to fresh state, used by
    /// `Create` when a sector is (re)claimed for a new file (`spec.md`
    /// §4.4 "Create"; mirrors the original zeroing `count`/`removing`/
    /// `removed` on every `Create`).
    pub fn reinit(&self, sector: u32) -> Arc<OpenFileEntry> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(sector)
            .or_insert_with(|| Arc::new(OpenFileEntry::fresh()));
        entry.reset();
        entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::PriorityAgent;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::thread::ThreadId;

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

    fn agent() -> Arc<dyn PriorityAgent> {
        Arc::new(TestAgent {
            id: std::thread::current().id(),
            priority: AtomicU8::new(1),
        })
    }

    #[test]
    fn get_or_create_returns_the_same_entry_for_the_same_sector() {
        let table = OpenFileTable::new();
        let a = table.get_or_create(5);
        a.register_open();
        let b = table.get_or_create(5);
        assert_eq!(b.open_count(), 1);
    }

    #[test]
    fn close_wakes_a_pending_remover_once_the_count_hits_zero() {
        let table = Arc::new(OpenFileTable::new());
        let entry = table.get_or_create(1);
        entry.register_open();

        let caller = agent();
        entry.close(&caller);
        assert_eq!(entry.open_count(), 0);
    }

    #[test]
    fn reinit_clears_removed_and_removing_flags() {
        let table = OpenFileTable::new();
        let entry = table.get_or_create(2);
        *entry.removed.lock() = true;
        *entry.removing.lock() = true;
        let reinit = table.reinit(2);
        assert!(!reinit.is_removed());
        assert!(!reinit.is_removing());
    }
}
