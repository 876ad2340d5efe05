//! The memory manager: ties the global frame bitmap/core map/replacement
//! policy to a specific [`AddressSpace`] during fault handling
//! (`spec.md` §4.3 "Page fault handler").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use crate::config::KernelConfig;
use crate::errors::fatal;
use crate::sched::Thread;

use super::address_space::AddressSpace;
use super::core_map::CoreMap;
use super::frame_bitmap::FrameBitmap;
use super::page_table::NOT_RESIDENT;
use super::process_table::ProcessTable;
use super::replacement::Replacer;
use super::tlb::TlbEntry;
use super::MemError;

/// Owns every structure `spec.md` §3 calls process-wide: the frame bitmap,
/// the core map, the running-process table, and the simulated physical
/// memory the bitmap's frames index into.
pub struct Memory {
    page_size: usize,
    swap_enabled: bool,
    frame_bitmap: FrameBitmap,
    core_map: CoreMap,
    process_table: ProcessTable,
    replacer: Replacer,
    physical_memory: spin::Mutex<Vec<u8>>,
    tick: AtomicU64,
}

impl Memory {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            page_size: config.sector_size,
            swap_enabled: config.swap_enabled,
            frame_bitmap: FrameBitmap::new(config.num_frames),
            core_map: CoreMap::new(config.num_frames),
            process_table: ProcessTable::new(),
            replacer: Replacer::new(config.replacement_policy, config.random_seed),
            physical_memory: spin::Mutex::new(vec![0u8; config.num_frames * config.sector_size]),
            tick: AtomicU64::new(0),
        }
    }

    pub fn process_table(&self) -> &ProcessTable {
        &self.process_table
    }

    pub fn frame_bitmap(&self) -> &FrameBitmap {
        &self.frame_bitmap
    }

    pub fn core_map(&self) -> &CoreMap {
        &self.core_map
    }

    /// Bytes per page/sector/frame, for callers translating addresses.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Registers an address space built without going through
    /// [`Memory::load_eagerly`] (the demand-loading path: `Exec` still
    /// needs the space visible to eviction's victim lookup even though no
    /// frames are claimed up front).
    pub fn register_address_space(&self, space: &Arc<AddressSpace>) {
        self.process_table.register(space);
    }

    /// Translates a virtual address to a physical byte offset through
    /// `space`'s TLB, or `None` if the page has no resident translation
    /// (the caller must service a fault and retry). Used by the trap
    /// dispatcher's user-memory copy-in/copy-out (`spec.md` §4.5).
    pub fn translate(&self, space: &Arc<AddressSpace>, vaddr: usize) -> Option<usize> {
        let vpn = space.checked_vpn(vaddr / self.page_size);
        let entry = space.tlb().lock().lookup(vpn)?;
        if !entry.valid || entry.frame == NOT_RESIDENT {
            return None;
        }
        Some(entry.frame * self.page_size + vaddr % self.page_size)
    }

    /// Reads one byte of simulated physical memory at `offset`.
    pub fn read_phys(&self, offset: usize) -> u8 {
        self.physical_memory.lock()[offset]
    }

    /// Writes one byte of simulated physical memory at `offset`.
    pub fn write_phys(&self, offset: usize, value: u8) {
        self.physical_memory.lock()[offset] = value;
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Eagerly loads every page of `space` and claims its frames
    /// (`spec.md` §4.3 step 4, "if demand-loading is disabled").
    pub fn load_eagerly(&self, space: &Arc<AddressSpace>) -> Result<(), MemError> {
        for vpn in 0..space.page_count() {
            let frame = self.frame_bitmap.allocate().ok_or(MemError::NoFreeFrame)?;
            self.core_map
                .bind(frame, space.space_id(), vpn, self.next_tick());
            space.bind_eager(vpn, frame);
            let mut memory = self.physical_memory.lock();
            let start = frame * self.page_size;
            space.load_page_from_executable(vpn, &mut memory[start..start + self.page_size]);
        }
        self.process_table.register(space);
        Ok(())
    }

    /// `spec.md` §4.3 "Page fault handler".
    pub fn handle_page_fault(&self, space: &Arc<AddressSpace>, thread: &Arc<Thread>, bad_addr: usize) {
        let vpn = space.checked_vpn(bad_addr / self.page_size);

        let resident_frame = space.page_table().entry(vpn).lock().is_resident().then(|| {
            space.page_table().entry(vpn).lock().frame
        });

        if let Some(frame) = resident_frame {
            // A reference that only missed the TLB, not the page table:
            // still counts as a use for LRU recency (`spec.md` §4.3:
            // "used (referenced since last clear)").
            self.core_map.touch(frame, self.next_tick());
        } else {
            let frame = self.acquire_frame();

            self.core_map
                .bind(frame, space.space_id(), vpn, self.next_tick());

            let mut pte = space.page_table().entry(vpn).lock();
            pte.frame = frame;
            pte.valid = true;
            let dirty = pte.dirty;
            drop(pte);

            let mut memory = self.physical_memory.lock();
            let start = frame * self.page_size;
            let page = &mut memory[start..start + self.page_size];
            if dirty {
                space
                    .swap()
                    .expect("dirty page-table entry with swap disabled")
                    .read_page(vpn, page);
            } else {
                space.load_page_from_executable(vpn, page);
            }
        }

        self.refresh_tlb(space, thread, vpn);
        debug!(
            "page fault serviced: space {} vpn {vpn}",
            space.space_id().as_u64()
        );
    }

    /// Steps 2.a/2.b: find a frame for `vpn`, evicting a victim via the
    /// configured replacement policy if memory is full.
    fn acquire_frame(&self) -> usize {
        if let Some(frame) = self.frame_bitmap.allocate() {
            return frame;
        }

        if !self.swap_enabled {
            fatal("no free frame and swap is disabled");
        }

        let victim_frame = self
            .replacer
            .choose_victim(&self.core_map)
            .unwrap_or_else(|| fatal("no resident frame available to evict"));
        let victim = self
            .core_map
            .get(victim_frame)
            .unwrap_or_else(|| fatal("replacement policy chose an unbound frame"));

        if let Some(victim_space) = self.process_table.get(victim.space_id) {
            victim_space.evict_tlb_entry(victim.vpn);
            let mut pte = victim_space.page_table().entry(victim.vpn).lock();
            if pte.dirty {
                let memory = self.physical_memory.lock();
                let start = victim_frame * self.page_size;
                victim_space
                    .swap()
                    .expect("dirty victim page with swap disabled")
                    .write_page(victim.vpn, &memory[start..start + self.page_size]);
            }
            pte.valid = false;
            pte.frame = NOT_RESIDENT;
        }
        // A victim process that has already exited (Design Notes §9,
        // "weak references"): nothing to write back, the frame is simply
        // reused.
        victim_frame
    }

    /// Step 3: refresh the TLB by round-robin on the thread's fault
    /// counter, flushing whatever the victim slot held back to its page
    /// table first.
    fn refresh_tlb(&self, space: &Arc<AddressSpace>, thread: &Arc<Thread>, vpn: usize) {
        let tlb_size = space.tlb().lock().size();
        if tlb_size == 0 {
            return;
        }
        let slot = thread.next_fault_slot(tlb_size);
        let pte = *space.page_table().entry(vpn).lock();
        let entry = TlbEntry {
            virtual_page: pte.virtual_page,
            frame: pte.frame,
            valid: pte.valid,
            used: pte.used,
            dirty: pte.dirty,
            read_only: pte.read_only,
        };
        space
            .tlb()
            .lock()
            .install(slot, entry, space.page_table());
    }

    /// `SaveState` (`spec.md` §4.3 "Context switch"): flushes `space`'s
    /// TLB entries back into its page table and invalidates the TLB.
    pub fn save_state(&self, space: &Arc<AddressSpace>) {
        space.tlb().lock().flush_all(space.page_table());
    }

    /// `Destruction` (`spec.md` §4.3): releases every resident frame and
    /// drops the process-table registration.
    pub fn destroy_address_space(&self, space: &Arc<AddressSpace>) {
        space.destroy(&self.frame_bitmap, &self.physical_memory);
        self.process_table.unregister(space.space_id());
    }
}
