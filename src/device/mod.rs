//! External collaborators (`spec.md` §6).
//!
//! The simulated MIPS CPU/MMU, the raw disk, and the console are out of
//! scope for this crate (§1) -- they are modeled here as traits, the same
//! way the teacher kernel abstracts hardware behind `Device`/`CharDevice`/
//! `BlockDevice` (`src/kernel/core/traits.rs`). Production code is generic
//! over these traits; `mem_disk`/`stdio_console` provide the
//! implementations this crate's own tests and demo binary run against.

mod mem_disk;
mod noff;
mod stdio_console;

pub use mem_disk::MemDisk;
pub use noff::NoffExecutable;
pub use stdio_console::StdioConsole;

/// A sector-addressed block device (`spec.md` §6, "Disk device").
///
/// Real disk I/O is asynchronous with completion signalled by an
/// interrupt; callers on this side of the trait only ever see the
/// synchronous view (`SynchDisk` in the original), since the raw
/// interrupt-driven device model is out of scope.
pub trait Disk: Send + Sync {
    /// Bytes per sector.
    fn sector_size(&self) -> usize;

    /// Total number of addressable sectors.
    fn num_sectors(&self) -> usize;

    /// Synchronously read sector `n` into `buf` (`buf.len() ==
    /// sector_size()`).
    fn read_sector(&self, n: usize, buf: &mut [u8]);

    /// Synchronously write sector `n` from `buf` (`buf.len() ==
    /// sector_size()`).
    fn write_sector(&self, n: usize, buf: &[u8]);
}

/// A character console (`spec.md` §6, "Console device").
///
/// The original wraps interrupt-driven read/write-done signals in two
/// semaphores and two locks so a reader and a writer may proceed
/// concurrently while readers serialize among themselves (ditto writers).
/// That synchronous behavior is exactly what this trait's blocking methods
/// are expected to provide; the underlying interrupt plumbing is out of
/// scope.
pub trait Console: Send + Sync {
    /// Blocks until one character is available and returns it.
    fn read_char(&self) -> u8;

    /// Blocks until `ch` has been written out.
    fn write_char(&self, ch: u8);
}

/// Virtual-to-physical translation and program-counter bookkeeping
/// (`spec.md` §6, "CPU simulator").
///
/// `ReadMem`/`WriteMem` on the original route through the MMU with retry,
/// so that a page fault raised mid-copy can be serviced and the copy
/// resumed (§4.5); `translate` here plays that role for the trap
/// dispatcher's user-memory copies.
pub trait Mmu {
    /// Translates `vaddr` to a physical byte offset the caller may read or
    /// write directly, or `None` if the page is not resident (a fault
    /// must be serviced by the caller before retrying).
    fn translate(&self, vaddr: u64) -> Option<usize>;

    /// Applies the MIPS branch-delay PC advance discipline described in
    /// `spec.md` §4.5: `PREV <- PC, PC <- NEXT, NEXT <- NEXT + 4`.
    fn advance_pc(&self);

    /// `Machine::ReadRegister`: register `2` carries the syscall id on
    /// entry and the return value on exit, `4..=7` carry arguments
    /// (`spec.md` §4.5).
    fn read_register(&self, reg: usize) -> u64;

    /// `Machine::WriteRegister`.
    fn write_register(&self, reg: usize, value: u64);
}

/// The fixed-layout executable format described in `spec.md` §6.
pub trait Executable {
    /// `false` if the magic number check fails.
    fn check_magic(&self) -> bool;

    /// Total in-memory size in bytes (code + initialized data +
    /// uninitialized data).
    fn size(&self) -> usize;

    /// `(in-file offset, byte size)` of the code segment.
    fn code_segment(&self) -> (usize, usize);

    /// In-memory load address of the code segment.
    fn code_addr(&self) -> usize;

    /// `(in-file offset, byte size)` of the initialized-data segment.
    fn data_segment(&self) -> (usize, usize);

    /// In-memory load address of the initialized-data segment.
    fn data_addr(&self) -> usize;

    /// Size, in bytes, of the uninitialized-data (bss) segment.
    fn uninit_data_size(&self) -> usize;

    /// Reads `len` bytes of code starting at in-file `offset` into `buf`.
    fn read_code_block(&self, buf: &mut [u8], len: usize, offset: usize);

    /// Reads `len` bytes of initialized data starting at in-file `offset`
    /// into `buf`.
    fn read_data_block(&self, buf: &mut [u8], len: usize, offset: usize);
}
