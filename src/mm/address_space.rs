//! Per-process address space (`spec.md` §3 "Address space", §4.3
//! "Construction"/"Destruction").

use std::sync::{Arc, OnceLock};

use crate::config::KernelConfig;
use crate::device::Executable;
use crate::errors::fatal;
use crate::sched::SpaceId;

use super::page_table::{PageTable, NOT_RESIDENT};
use super::tlb::Tlb;
use super::MemError;

/// Something that can hold a process's swapped-out dirty pages, keyed by
/// virtual page number. Implemented by `fs`'s per-process swap file, but
/// named here (dependency inversion, as with
/// [`crate::sync::PriorityAgent`]) so `mm` never needs to depend
/// upward on `fs`.
pub trait SwapBackend: Send + Sync {
    fn read_page(&self, vpn: usize, buf: &mut [u8]);
    fn write_page(&self, vpn: usize, buf: &[u8]);
}

/// A process's virtual address space.
pub struct AddressSpace {
    space_id: SpaceId,
    page_table: PageTable,
    tlb: spin::Mutex<Tlb>,
    executable: Arc<dyn Executable + Send + Sync>,
    code_segment: (usize, usize), // (in-file offset, size)
    code_addr: usize,
    data_segment: (usize, usize),
    data_addr: usize,
    /// The per-process swap file, attached once known. `AddressSpace::new`
    /// cannot always take this at construction time: a swap file's size
    /// is `page_count() * page_size`, and `page_count()` is itself a
    /// product of construction, so the caller that needs swap first
    /// builds the address space, then creates the swap file, then calls
    /// [`AddressSpace::set_swap`].
    swap: OnceLock<Arc<dyn SwapBackend>>,
    page_size: usize,
}

impl AddressSpace {
    /// `spec.md` §4.3 "Construction". `tlb_size` is the simulated
    /// machine's TLB slot count (0 disables TLB refresh bookkeeping
    /// entirely -- the "no-TLB build" `spec.md` mentions under
    /// `RestoreState`).
    pub fn new(
        space_id: SpaceId,
        executable: Arc<dyn Executable + Send + Sync>,
        config: &KernelConfig,
        tlb_size: usize,
        swap: Option<Arc<dyn SwapBackend>>,
    ) -> Result<Self, MemError> {
        if !executable.check_magic() {
            return Err(MemError::BadMagic);
        }

        let code_segment = executable.code_segment();
        let data_segment = executable.data_segment();
        let uninit_size = executable.uninit_data_size();

        let total_size = code_segment.1 + data_segment.1 + uninit_size + config.user_stack_size;
        let page_count = total_size.div_ceil(config.sector_size);

        let space = Self {
            space_id,
            page_table: PageTable::new(page_count),
            tlb: spin::Mutex::new(Tlb::new(tlb_size)),
            code_addr: executable.code_addr(),
            data_addr: executable.data_addr(),
            code_segment,
            data_segment,
            executable,
            swap: OnceLock::new(),
            page_size: config.sector_size,
        };
        if let Some(swap) = swap {
            space.set_swap(swap);
        }
        Ok(space)
    }

    /// Attaches a swap backend after construction, once its size is known
    /// (see the `swap` field's doc comment). A no-op if a backend is
    /// already attached.
    pub fn set_swap(&self, swap: Arc<dyn SwapBackend>) {
        let _ = self.swap.set(swap);
    }

    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    pub fn page_count(&self) -> usize {
        self.page_table.page_count()
    }

    pub(super) fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub(super) fn tlb(&self) -> &spin::Mutex<Tlb> {
        &self.tlb
    }

    pub(super) fn page_size(&self) -> usize {
        self.page_size
    }

    pub(super) fn swap(&self) -> Option<&Arc<dyn SwapBackend>> {
        self.swap.get()
    }

    /// Fills `dest` (one page, `page_size` bytes) with this program's code
    /// and initialized-data bytes that fall within the page starting at
    /// `vpn * page_size`, zero-filling everything else (`spec.md` §4.3
    /// step 2.d, "stack pages are fully zeroed").
    pub(super) fn load_page_from_executable(&self, vpn: usize, dest: &mut [u8]) {
        dest.fill(0);
        let page_start = vpn * self.page_size;
        let page_end = page_start + self.page_size;

        Self::copy_segment(
            self.code_addr,
            self.code_segment,
            page_start,
            page_end,
            dest,
            |buf, len, offset| self.executable.read_code_block(buf, len, offset),
        );
        Self::copy_segment(
            self.data_addr,
            self.data_segment,
            page_start,
            page_end,
            dest,
            |buf, len, offset| self.executable.read_data_block(buf, len, offset),
        );
    }

    fn copy_segment(
        seg_addr: usize,
        seg: (usize, usize),
        page_start: usize,
        page_end: usize,
        dest: &mut [u8],
        read_block: impl FnOnce(&mut [u8], usize, usize),
    ) {
        let (seg_offset, seg_size) = seg;
        if seg_size == 0 {
            return;
        }
        let seg_start = seg_addr;
        let seg_end = seg_addr + seg_size;
        let start = page_start.max(seg_start);
        let end = page_end.min(seg_end);
        if start >= end {
            return;
        }
        let file_offset = seg_offset + (start - seg_start);
        let len = end - start;
        read_block(&mut dest[start - page_start..end - page_start], len, file_offset);
    }

    /// Eagerly binds `frame` to `vpn` without going through the fault path,
    /// for demand-loading-disabled builds (`spec.md` §4.3 step 4).
    pub(super) fn bind_eager(&self, vpn: usize, frame: usize) {
        let mut pte = self.page_table.entry(vpn).lock();
        pte.frame = frame;
        pte.valid = true;
    }

    /// Clears the TLB slot (if any) holding a translation for `vpn`,
    /// flushing its used/dirty bits back into the page table first
    /// (`spec.md` §4.3 step 2.b, "EvacuatePage").
    pub(super) fn evict_tlb_entry(&self, vpn: usize) {
        self.tlb.lock().evict_page(vpn, &self.page_table);
    }

    /// Asserts `vpn` is within this address space, the one fatal page-
    /// fault condition `spec.md` §7 names ("only a page fault on a
    /// virtual page outside the program's address space is fatal").
    pub(super) fn checked_vpn(&self, vpn: usize) -> usize {
        if vpn >= self.page_table.page_count() {
            fatal("page fault outside the program's address space");
        }
        vpn
    }

    /// `Destruction` (`spec.md` §4.3): clears every resident frame from
    /// the bitmap and zeros its backing memory. Dropping `self` releases
    /// the owned executable/swap handles.
    pub fn destroy(&self, bitmap: &super::FrameBitmap, physical_memory: &spin::Mutex<Vec<u8>>) {
        for vpn in 0..self.page_table.page_count() {
            let mut pte = self.page_table.entry(vpn).lock();
            if pte.is_resident() {
                let frame = pte.frame;
                let mut memory = physical_memory.lock();
                let start = frame * self.page_size;
                memory[start..start + self.page_size].fill(0);
                bitmap.free(frame);
                pte.valid = false;
                pte.frame = NOT_RESIDENT;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Executable;
    use crate::mm::FrameBitmap;

    /// Mirrors `NoffExecutable`'s own file layout (header, then code, then
    /// data, all at absolute file offsets) rather than treating `code`/
    /// `data` as separate byte buffers, since `code_segment`/`data_segment`
    /// offsets are absolute file positions (`device/noff.rs`).
    struct FakeExecutable {
        magic_ok: bool,
        code: (usize, usize, usize), // offset, addr, size
        data: (usize, usize, usize),
        uninit_size: usize,
        file_bytes: Vec<u8>,
    }

    impl Executable for FakeExecutable {
        fn check_magic(&self) -> bool {
            self.magic_ok
        }
        fn size(&self) -> usize {
            self.code.2 + self.data.2 + self.uninit_size
        }
        fn code_segment(&self) -> (usize, usize) {
            (self.code.0, self.code.2)
        }
        fn code_addr(&self) -> usize {
            self.code.1
        }
        fn data_segment(&self) -> (usize, usize) {
            (self.data.0, self.data.2)
        }
        fn data_addr(&self) -> usize {
            self.data.1
        }
        fn uninit_data_size(&self) -> usize {
            self.uninit_size
        }
        fn read_code_block(&self, buf: &mut [u8], len: usize, offset: usize) {
            buf[..len].copy_from_slice(&self.file_bytes[offset..offset + len]);
        }
        fn read_data_block(&self, buf: &mut [u8], len: usize, offset: usize) {
            buf[..len].copy_from_slice(&self.file_bytes[offset..offset + len]);
        }
    }

    fn test_config() -> KernelConfig {
        KernelConfig {
            sector_size: 128,
            user_stack_size: 256,
            ..KernelConfig::default()
        }
    }

    #[test]
    fn bad_magic_is_rejected_before_any_page_table_is_built() {
        let executable: Arc<dyn Executable + Send + Sync> = Arc::new(FakeExecutable {
            magic_ok: false,
            code: (0, 0, 0),
            data: (0, 0, 0),
            uninit_size: 0,
            file_bytes: vec![],
        });
        let err = AddressSpace::new(SpaceId::fresh(), executable, &test_config(), 4, None).unwrap_err();
        assert!(matches!(err, MemError::BadMagic));
    }

    #[test]
    fn page_count_covers_code_data_uninit_and_stack_rounded_up() {
        let config = test_config();
        let executable: Arc<dyn Executable + Send + Sync> = Arc::new(FakeExecutable {
            magic_ok: true,
            code: (32, 0, 100),
            data: (132, 100, 50),
            uninit_size: 10,
            file_bytes: vec![0; 182],
        });
        let space = AddressSpace::new(SpaceId::fresh(), executable, &config, 4, None).unwrap();
        // 100 + 50 + 10 + 256 = 416, ceil(416 / 128) = 4.
        assert_eq!(space.page_count(), 4);
    }

    #[test]
    fn load_page_from_executable_places_code_and_data_at_their_own_addresses_and_zero_fills_the_rest() {
        let config = test_config();
        let code_bytes: Vec<u8> = (1..=8).collect();
        let data_bytes: Vec<u8> = (101..=104).collect();
        let mut file_bytes = vec![0u8; 44];
        file_bytes[32..40].copy_from_slice(&code_bytes);
        file_bytes[40..44].copy_from_slice(&data_bytes);
        let executable: Arc<dyn Executable + Send + Sync> = Arc::new(FakeExecutable {
            magic_ok: true,
            code: (32, 0, 8),
            data: (40, 64, 4),
            uninit_size: 0,
            file_bytes,
        });
        let space = AddressSpace::new(SpaceId::fresh(), executable, &config, 4, None).unwrap();

        let mut page = vec![0xFFu8; 128];
        space.load_page_from_executable(0, &mut page);
        assert_eq!(&page[0..8], &code_bytes[..]);
        assert_eq!(&page[64..68], &data_bytes[..]);
        assert!(page[8..64].iter().all(|&b| b == 0));
        assert!(page[68..].iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "page fault outside the program's address space")]
    fn checked_vpn_is_fatal_beyond_the_last_page() {
        let config = test_config();
        let executable: Arc<dyn Executable + Send + Sync> = Arc::new(FakeExecutable {
            magic_ok: true,
            code: (0, 0, 0),
            data: (0, 0, 0),
            uninit_size: 0,
            file_bytes: vec![],
        });
        let space = AddressSpace::new(SpaceId::fresh(), executable, &config, 4, None).unwrap();
        space.checked_vpn(space.page_count());
    }

    #[test]
    fn destroy_frees_every_resident_frame_back_to_the_bitmap() {
        let config = test_config();
        let executable: Arc<dyn Executable + Send + Sync> = Arc::new(FakeExecutable {
            magic_ok: true,
            code: (0, 0, 0),
            data: (0, 0, 0),
            uninit_size: 0,
            file_bytes: vec![],
        });
        let space = AddressSpace::new(SpaceId::fresh(), executable, &config, 4, None).unwrap();
        let bitmap = FrameBitmap::new(4);
        let physical_memory = spin::Mutex::new(vec![0u8; 4 * config.sector_size]);

        let frame = bitmap.allocate().unwrap();
        space.bind_eager(0, frame);
        space.destroy(&bitmap, &physical_memory);

        assert_eq!(bitmap.allocate(), Some(frame), "freed frame should be available again");
    }
}
