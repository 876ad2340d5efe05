//! Software-managed TLB simulation (`spec.md` §4.3 "Refresh the TLB").
//!
//! `spec.md` §5 notes "the TLB is owned by the running thread"; this crate
//! instead models one TLB per live [`super::AddressSpace`] (recorded as an
//! Open Question decision in `DESIGN.md`), since the simulated core itself
//! -- the thing that would otherwise make "currently running thread" a
//! well-defined owner -- is out of scope here (`spec.md` §1).

use super::page_table::{PageTableEntry, NOT_RESIDENT};

/// A single TLB slot.
#[derive(Debug, Clone, Copy)]
pub struct TlbEntry {
    pub virtual_page: usize,
    pub frame: usize,
    pub valid: bool,
    pub used: bool,
    pub dirty: bool,
    pub read_only: bool,
}

impl TlbEntry {
    fn empty() -> Self {
        Self {
            virtual_page: 0,
            frame: NOT_RESIDENT,
            valid: false,
            used: false,
            dirty: false,
            read_only: false,
        }
    }

    fn from_page_table_entry(entry: &PageTableEntry) -> Self {
        Self {
            virtual_page: entry.virtual_page,
            frame: entry.frame,
            valid: entry.valid,
            used: entry.used,
            dirty: entry.dirty,
            read_only: entry.read_only,
        }
    }
}

/// A fixed-size, software-managed translation cache.
pub struct Tlb {
    slots: Vec<TlbEntry>,
}

impl Tlb {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![TlbEntry::empty(); size],
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Looks up a valid translation for `vpn`.
    pub fn lookup(&self, vpn: usize) -> Option<TlbEntry> {
        self.slots
            .iter()
            .find(|slot| slot.valid && slot.virtual_page == vpn)
            .copied()
    }

    /// Installs `entry` into `slot`, first flushing whatever valid
    /// translation currently occupies it back into `page_table` (its
    /// accumulated dirty/used bits must not be lost, `spec.md` §4.3 step
    /// 3). Returns the flushed entry, if any.
    pub fn install(
        &mut self,
        slot: usize,
        entry: TlbEntry,
        page_table: &super::page_table::PageTable,
    ) -> Option<TlbEntry> {
        let evicted = self.flush_slot(slot, page_table);
        self.slots[slot] = entry;
        evicted
    }

    fn flush_slot(
        &mut self,
        slot: usize,
        page_table: &super::page_table::PageTable,
    ) -> Option<TlbEntry> {
        let previous = self.slots[slot];
        if previous.valid {
            let mut pte = page_table.entry(previous.virtual_page).lock();
            pte.used = previous.used;
            pte.dirty = previous.dirty;
        }
        previous.valid.then_some(previous)
    }

    /// If some slot holds a valid translation for `vpn`, flushes its
    /// used/dirty bits back into `page_table` and clears the slot.
    /// Returns whether a slot was found (`spec.md` §4.3 step 2.b,
    /// "EvacuatePage": "copy TLB-resident bits back to its page-table
    /// entry, clear its TLB slot").
    pub fn evict_page(&mut self, vpn: usize, page_table: &super::page_table::PageTable) -> bool {
        let Some(slot) = self
            .slots
            .iter()
            .position(|s| s.valid && s.virtual_page == vpn)
        else {
            return false;
        };
        self.flush_slot(slot, page_table);
        self.slots[slot] = TlbEntry::empty();
        true
    }

    /// Flushes every valid slot's accumulated bits back into `page_table`
    /// and invalidates the TLB (`spec.md` §4.3 "SaveState").
    pub fn flush_all(&mut self, page_table: &super::page_table::PageTable) {
        for slot in 0..self.slots.len() {
            self.flush_slot(slot, page_table);
            self.slots[slot] = TlbEntry::empty();
        }
    }

    /// Installs `entry` directly from a page-table entry, for
    /// `AddressSpace::install_page`.
    pub fn install_from_page_table_entry(
        &mut self,
        slot: usize,
        pte: &PageTableEntry,
        page_table: &super::page_table::PageTable,
    ) -> Option<TlbEntry> {
        self.install(slot, TlbEntry::from_page_table_entry(pte), page_table)
    }
}
