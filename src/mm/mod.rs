//! Memory/address-space layer (`spec.md` §4.3): frame bitmap, core map,
//! per-process page tables and software TLBs, demand loading, and swap-
//! backed page replacement. Depends on `sync` and `sched`; depended on by
//! `fs`/`trap`.

mod address_space;
mod core_map;
mod frame_bitmap;
mod memory;
mod page_table;
mod process_table;
mod replacement;
mod tlb;

pub use address_space::{AddressSpace, SwapBackend};
pub use core_map::{CoreMap, CoreMapEntry};
pub use frame_bitmap::FrameBitmap;
pub use memory::Memory;
pub use page_table::{PageTableEntry, NOT_RESIDENT};
pub use process_table::ProcessTable;
pub use tlb::TlbEntry;

use thiserror::Error;

/// Errors raised by the memory layer. Per `spec.md` §7, the page-fault
/// conditions called out as fatal are *not* represented here -- they go
/// straight to [`crate::errors::fatal`] -- this enum covers the
/// constructor-time failures a caller can recover from.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// `AddressSpace::new` with eager loading and no free frames.
    #[error("no free physical frame and swap is disabled")]
    NoFreeFrame,
    /// The executable's magic number check failed.
    #[error("executable magic number check failed")]
    BadMagic,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::device::Executable;
    use crate::sched::SpaceId;
    use std::sync::Arc;

    struct FixedExecutable {
        code: Vec<u8>,
        data: Vec<u8>,
    }

    impl Executable for FixedExecutable {
        fn check_magic(&self) -> bool {
            true
        }
        fn size(&self) -> usize {
            self.code.len() + self.data.len()
        }
        fn code_segment(&self) -> (usize, usize) {
            (0, self.code.len())
        }
        fn code_addr(&self) -> usize {
            0
        }
        fn data_segment(&self) -> (usize, usize) {
            (self.code.len(), self.data.len())
        }
        fn data_addr(&self) -> usize {
            self.code.len()
        }
        fn uninit_data_size(&self) -> usize {
            0
        }
        fn read_code_block(&self, buf: &mut [u8], len: usize, offset: usize) {
            buf[..len].copy_from_slice(&self.code[offset..offset + len]);
        }
        fn read_data_block(&self, buf: &mut [u8], len: usize, offset: usize) {
            let data_offset = offset - self.code.len();
            buf[..len].copy_from_slice(&self.data[data_offset..data_offset + len]);
        }
    }

    fn tiny_config() -> KernelConfig {
        KernelConfig {
            sector_size: 128,
            num_frames: 4,
            user_stack_size: 128,
            demand_loading: true,
            swap_enabled: false,
            ..KernelConfig::default()
        }
    }

    #[test]
    fn page_fault_loads_code_bytes_from_the_executable() {
        let config = tiny_config();
        let memory = Memory::new(&config);
        let executable = Arc::new(FixedExecutable {
            code: vec![0xAB; 128],
            data: vec![],
        });
        let space = Arc::new(
            AddressSpace::new(SpaceId::fresh(), executable, &config, 4, None).unwrap(),
        );

        let thread = crate::sched::Scheduler::new(crate::config::SchedulerKind::Fifo)
            .bootstrap_main_thread();

        memory.handle_page_fault(&space, &thread, 0);
        assert!(space.page_table().entry(0).lock().is_resident());
    }

    #[test]
    fn bitmap_and_core_map_stay_coherent_after_destroy() {
        let config = tiny_config();
        let memory = Memory::new(&config);
        let executable = Arc::new(FixedExecutable {
            code: vec![0x11; 128],
            data: vec![],
        });
        let space = Arc::new(
            AddressSpace::new(SpaceId::fresh(), executable, &config, 4, None).unwrap(),
        );
        memory.load_eagerly(&space).unwrap();
        assert!(memory.frame_bitmap().is_set(0));

        memory.destroy_address_space(&space);
        assert!(!memory.frame_bitmap().is_set(0));
        assert!(memory.core_map().get(0).is_none());
    }
}
