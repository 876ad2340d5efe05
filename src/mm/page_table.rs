//! Per-process page table (`spec.md` §3 "Address space").

/// Sentinel meaning "not resident", matching `spec.md`'s "a sentinel `not
/// resident` value" rather than an out-of-band `Option` at the storage
/// layer, so the layout mirrors the original's `int frame = -1`.
pub const NOT_RESIDENT: usize = usize::MAX;

/// A single page-table entry.
#[derive(Debug, Clone, Copy)]
pub struct PageTableEntry {
    pub virtual_page: usize,
    pub frame: usize,
    pub valid: bool,
    pub used: bool,
    pub dirty: bool,
    pub read_only: bool,
}

impl PageTableEntry {
    fn unmapped(virtual_page: usize) -> Self {
        Self {
            virtual_page,
            frame: NOT_RESIDENT,
            valid: false,
            used: false,
            dirty: false,
            read_only: false,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.valid && self.frame != NOT_RESIDENT
    }
}

/// A process's page table: one entry per virtual page, each independently
/// lockable so page-fault handling on one page never blocks bookkeeping on
/// another.
pub struct PageTable {
    entries: Vec<spin::Mutex<PageTableEntry>>,
}

impl PageTable {
    /// Creates a page table with `page_count` entries, all initially
    /// unmapped (`spec.md` §4.3 step 3).
    pub fn new(page_count: usize) -> Self {
        Self {
            entries: (0..page_count)
                .map(|vpn| spin::Mutex::new(PageTableEntry::unmapped(vpn)))
                .collect(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, vpn: usize) -> &spin::Mutex<PageTableEntry> {
        &self.entries[vpn]
    }

    /// Snapshot of every entry, for inspection/tests.
    pub fn snapshot(&self) -> Vec<PageTableEntry> {
        self.entries.iter().map(|e| *e.lock()).collect()
    }
}
