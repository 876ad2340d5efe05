//! Kernel-wide tunables.
//!
//! The original collects these as scattered `const`s; this crate collects
//! them into one struct so a test can stand up a kernel with, say, S2's
//! `sector_size = 128` / tiny frame pool without touching process-wide
//! constants (see `SPEC_FULL.md` §2).

/// Page replacement policy selected for a kernel instance (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Evict the frame that has been resident longest.
    Fifo,
    /// Evict the frame least recently referenced.
    Lru,
    /// Evict a uniformly random resident frame.
    Random,
}

/// Ready-structure variant selected for a kernel instance (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Plain FIFO ready queue.
    Fifo,
    /// Priority-keyed multi-level ready queue (enables priority donation).
    MultiLevel,
}

/// Default sector size used by the simulated disk (bytes).
pub const DEFAULT_SECTOR_SIZE: usize = 128;

/// Default simulated page size (bytes). Matches the sector size in the
/// original so a page swaps to exactly one sector range.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Default user stack allowance, in bytes, added to a program's page count
/// at `AddressSpace` construction (§4.3 step 2).
pub const DEFAULT_USER_STACK_SIZE: usize = 1024;

/// Standard argument-area reservation the MIPS calling convention expects
/// below the initial stack pointer (§4.5).
pub const ARG_AREA_RESERVATION: usize = 24;

/// Longest file/directory name a single directory entry can hold,
/// matching the original's `FILE_NAME_MAX_LEN`.
pub const FILE_NAME_MAX_LEN: usize = 63;

/// Number of entries the root directory (and every freshly `CreateDir`'d
/// directory) is seeded with at format time (`original_source/filesys/
/// file_system.cc`'s `NUM_DIR_ENTRIES`). `Directory::Add` grows the table
/// one entry at a time past this, per `spec.md` §4.4.
pub const NUM_DIR_ENTRIES: usize = 10;

/// Well-known sector numbers (`spec.md` §6 "Persisted state layout").
pub const FREE_MAP_SECTOR: u32 = 0;
pub const ROOT_DIRECTORY_SECTOR: u32 = 1;

/// Collected kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Bytes per disk sector; also the logical page size (see
    /// `SPEC_FULL.md` §3).
    pub sector_size: usize,
    /// Number of sectors the simulated disk exposes.
    pub num_sectors: usize,
    /// Number of physical frames in the simulated machine.
    pub num_frames: usize,
    /// Page-replacement policy used once physical memory is exhausted.
    pub replacement_policy: ReplacementPolicy,
    /// Ready-structure variant.
    pub scheduler_kind: SchedulerKind,
    /// Whether pages are loaded on first fault (`true`) or eagerly at
    /// `Exec` time (`false`).
    pub demand_loading: bool,
    /// Whether evicted dirty pages may swap out to a per-process swap
    /// file. Irrelevant when `demand_loading` is `false`.
    pub swap_enabled: bool,
    /// Seed for the kernel-wide PRNG (RANDOM replacement policy, any other
    /// place a reproducible random choice is needed).
    pub random_seed: u64,
    /// Extra bytes reserved for the user stack above code+data+bss, in
    /// units of `sector_size`-sized pages.
    pub user_stack_size: usize,
    /// Simulated machine's TLB slot count (`AddressSpace::new`'s
    /// `tlb_size`); 0 selects the "no-TLB build" (`spec.md` §4.3
    /// `RestoreState`).
    pub tlb_size: usize,
    /// Host directory `Exec`'s path argument is resolved against. Exec
    /// itself is in-scope (`spec.md` §4.5); where on the *host* its NOFF
    /// executables live is plumbing outside the spec, so this is kept
    /// alongside the other already-resolved boot-time configuration
    /// rather than invented inside the trap dispatcher.
    pub program_dir: String,
}

impl KernelConfig {
    /// Number of direct data-sector slots a single file header can hold,
    /// derived so that one `RawFileHeader` occupies exactly one sector --
    /// see `examples/original_source/filesys/raw_file_header.hh` and
    /// `SPEC_FULL.md` §3.
    ///
    /// On disk a header is `numBytes: u32, dataSectors: [u32; NUM_DIRECT],
    /// nextFileHeader: u32`: two fixed `u32` fields plus the direct array.
    /// `numSectors` is not a third stored field -- it is always `ceil(
    /// numBytes / sectorSize)`, so keeping it on disk would only double up
    /// a value already implied by `numBytes`.
    pub fn num_direct(&self) -> usize {
        const FIXED_FIELDS: usize = 2; // numBytes, nextFileHeader
        (self.sector_size / 4).saturating_sub(FIXED_FIELDS)
    }

    /// Bytes a single header's direct slots can address.
    pub fn header_capacity_bytes(&self) -> usize {
        self.num_direct() * self.sector_size
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            num_sectors: 4096,
            num_frames: 32,
            replacement_policy: ReplacementPolicy::Fifo,
            scheduler_kind: SchedulerKind::MultiLevel,
            demand_loading: true,
            swap_enabled: true,
            random_seed: 0,
            user_stack_size: DEFAULT_USER_STACK_SIZE,
            tlb_size: 4,
            program_dir: ".".to_string(),
        }
    }
}

/// Bootstrap flags as named in `spec.md` §6 ("CLI"). Parsing them from
/// `argv` is explicitly out of scope (§1); this struct is the already-
/// parsed external interface the boot sequence consumes.
#[derive(Debug, Clone, Default)]
pub struct BootArgs {
    /// `-f`: format the disk before anything else runs.
    pub format: bool,
    /// `-x <path>`: path of a user program to `Exec` after boot.
    pub exec: Option<String>,
    /// `-d <chars>`: debug categories to enable (opaque to the core; kept
    /// only so callers can thread it through to the logging facade).
    pub debug_categories: String,
    /// `-rs <n>`: random seed.
    pub random_seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_direct_leaves_room_for_the_two_fixed_header_fields() {
        let config = KernelConfig {
            sector_size: 128,
            ..KernelConfig::default()
        };
        // 128 / 4 = 32 words, minus numBytes and nextFileHeader leaves 30.
        assert_eq!(config.num_direct(), 30);
    }

    #[test]
    fn header_capacity_bytes_is_num_direct_times_sector_size() {
        let config = KernelConfig {
            sector_size: 128,
            ..KernelConfig::default()
        };
        assert_eq!(config.header_capacity_bytes(), 30 * 128);
    }

    #[test]
    fn num_direct_saturates_at_zero_for_a_sector_too_small_to_hold_the_fixed_fields() {
        let config = KernelConfig {
            sector_size: 4,
            ..KernelConfig::default()
        };
        assert_eq!(config.num_direct(), 0);
    }
}
