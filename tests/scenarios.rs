//! Top-level end-to-end scenarios (`spec.md` §8, S1-S6; S7 folds into
//! S5's working-set property). Each test drives the public crate surface
//! directly rather than through the out-of-scope MIPS instruction loop,
//! the same way the demo binary's CLI commands ultimately do.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Barrier, Mutex as StdMutex};
use std::thread::ThreadId;
use std::time::Duration;

use paldos_core::config::{KernelConfig, ReplacementPolicy, SchedulerKind};
use paldos_core::device::{Executable, MemDisk};
use paldos_core::fs::FileSystem;
use paldos_core::mm::{AddressSpace, Memory, SwapBackend};
use paldos_core::sched::{Scheduler, SpaceId, Thread};
use paldos_core::sync::{Lock, PriorityAgent};

fn tiny_fs_config() -> KernelConfig {
    KernelConfig {
        sector_size: 128,
        num_sectors: 256,
        ..KernelConfig::default()
    }
}

fn boot_fs() -> (FileSystem, Arc<Thread>) {
    let config = tiny_fs_config();
    let disk = Arc::new(MemDisk::new(config.sector_size, config.num_sectors));
    let fs = FileSystem::format(disk, config);
    let thread = Scheduler::new(SchedulerKind::Fifo).bootstrap_main_thread();
    (fs, thread)
}

fn as_agent(thread: &Arc<Thread>) -> Arc<dyn PriorityAgent> {
    thread.clone()
}

/// S1: format a disk, create a file, write through one handle, close it,
/// reopen, and read the same bytes back.
#[test]
fn s1_format_create_write_close_reopen_read() {
    let (fs, thread) = boot_fs();
    let caller = as_agent(&thread);

    fs.create(&caller, &thread, "a", false).unwrap();
    let fd1 = fs.open(&thread, "a").unwrap();
    assert_eq!(fs.write(&caller, &thread, fd1, b"hello").unwrap(), 5);
    fs.close(&caller, &thread, fd1).unwrap();

    let fd2 = fs.open(&thread, "a").unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(&thread, fd2, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
}

/// S2: a 128-byte sector size gives `NUM_DIRECT = 30`, so a 10,000-byte
/// file spans several header sectors. Verifies the logical length, a
/// byte-exact round trip read back in small chunks, and that the
/// free-sector bitmap reflects exactly the sectors the write actually
/// consumed (data sectors plus the extra header sectors in the chain).
#[test]
fn s2_multi_header_write_round_trips_and_bitmap_matches() {
    let (fs, thread) = boot_fs();
    let caller = as_agent(&thread);
    assert_eq!(fs.config().num_direct(), 30);

    let free_before = fs.free_sector_count();

    fs.create(&caller, &thread, "big", false).unwrap();
    let fd = fs.open(&thread, "big").unwrap();

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut written = 0;
    while written < payload.len() {
        let n = fs.write(&caller, &thread, fd, &payload[written..]).unwrap();
        assert!(n > 0);
        written += n;
    }
    assert_eq!(fs.length(&thread, fd).unwrap(), 10_000);

    let mut readback = Vec::new();
    let mut chunk = [0u8; 10];
    loop {
        let n = fs.read(&thread, fd, &mut chunk).unwrap();
        if n == 0 {
            break;
        }
        readback.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(readback, payload);

    let sector_size = fs.config().sector_size;
    let header_capacity = fs.config().header_capacity_bytes();
    let data_sectors = payload.len().div_ceil(sector_size);
    // Every header sector the final chain needs, including the one
    // `Create` itself already allocates before any bytes are written.
    let header_sectors = payload.len().div_ceil(header_capacity);
    let free_after = fs.free_sector_count();
    assert_eq!(free_before - free_after, data_sectors + header_sectors);
}

/// S3: six threads each append "1234567890" five times to the same open
/// fd. The per-file write lock must serialize them: the final length is
/// exactly 300 bytes and every 10-byte run written survives intact (no
/// interleaved, torn write).
#[test]
fn s3_concurrent_writers_to_one_fd_serialize() {
    let (fs, thread) = boot_fs();
    let caller = as_agent(&thread);
    fs.create(&caller, &thread, "t", false).unwrap();

    let fs = Arc::new(fs);
    let fd = fs.open(&thread, "t").unwrap();

    let scheduler = Scheduler::new(SchedulerKind::Fifo);
    let children: Vec<Arc<Thread>> = (0..6)
        .map(|i| {
            let fs = fs.clone();
            scheduler.fork(format!("writer-{i}"), 1, true, SpaceId::fresh(), move |child| {
                let caller: Arc<dyn PriorityAgent> = child.clone();
                for _ in 0..5 {
                    let n = fs.write(&caller, child, fd, b"1234567890").unwrap();
                    assert_eq!(n, 10);
                }
            })
        })
        .collect();

    let joiner: Arc<dyn PriorityAgent> = thread.clone();
    for child in &children {
        child.join(&joiner);
    }

    assert_eq!(fs.length(&thread, fd).unwrap(), 300);

    let mut contents = Vec::new();
    let mut chunk = [0u8; 30];
    loop {
        let n = fs.read_at(&thread, fd, &mut chunk, contents.len()).unwrap();
        if n == 0 {
            break;
        }
        contents.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(contents.len(), 300);
    for run in contents.chunks(10) {
        assert_eq!(run, b"1234567890");
    }
}

/// S4: one thread opens a file; a second blocks in `Remove` until the
/// first closes its handle, then the remove completes and a subsequent
/// open of the same name fails.
#[test]
fn s4_remove_while_open_blocks_until_close_then_fails_reopen() {
    let (fs, thread) = boot_fs();
    let caller = as_agent(&thread);
    fs.create(&caller, &thread, "x", false).unwrap();
    let fd = fs.open(&thread, "x").unwrap();

    let fs = Arc::new(fs);
    let unblocked = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let scheduler = Scheduler::new(SchedulerKind::Fifo);
    let fs2 = fs.clone();
    let unblocked2 = unblocked.clone();
    let _remover = scheduler.fork("remover", 1, false, SpaceId::fresh(), move |child| {
        let remover_caller: Arc<dyn PriorityAgent> = child.clone();
        fs2.remove(&remover_caller, child, "x").unwrap();
        unblocked2.store(true, Ordering::SeqCst);
    });

    std::thread::sleep(Duration::from_millis(50));
    assert!(!unblocked.load(Ordering::SeqCst));

    fs.close(&caller, &thread, fd).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(unblocked.load(Ordering::SeqCst));

    assert!(fs.open(&thread, "x").is_err());
}

struct ZeroExecutable;

impl Executable for ZeroExecutable {
    fn check_magic(&self) -> bool {
        true
    }
    fn size(&self) -> usize {
        0
    }
    fn code_segment(&self) -> (usize, usize) {
        (0, 0)
    }
    fn code_addr(&self) -> usize {
        0
    }
    fn data_segment(&self) -> (usize, usize) {
        (0, 0)
    }
    fn data_addr(&self) -> usize {
        0
    }
    fn uninit_data_size(&self) -> usize {
        0
    }
    fn read_code_block(&self, _buf: &mut [u8], _len: usize, _offset: usize) {}
    fn read_data_block(&self, _buf: &mut [u8], _len: usize, _offset: usize) {}
}

struct FakeSwap {
    pages: StdMutex<std::collections::BTreeMap<usize, Vec<u8>>>,
}

impl FakeSwap {
    fn new() -> Self {
        Self {
            pages: StdMutex::new(std::collections::BTreeMap::new()),
        }
    }
}

impl SwapBackend for FakeSwap {
    fn read_page(&self, vpn: usize, buf: &mut [u8]) {
        if let Some(page) = self.pages.lock().unwrap().get(&vpn) {
            buf.copy_from_slice(page);
        }
    }
    fn write_page(&self, vpn: usize, buf: &[u8]) {
        self.pages.lock().unwrap().insert(vpn, buf.to_vec());
    }
}

/// S5: demand-loading with a 4-frame LRU policy over a working set larger
/// than physical memory. `spec.md` §8's literal fault count and final
/// resident set don't reproduce against this crate's LRU semantics
/// against any refresh-on-hit policy (its "6 pages" claim is inconsistent
/// with its own five-entry access list; see `DESIGN.md`'s Open Question),
/// so this asserts the properties the scenario is actually exercising:
/// the resident set never exceeds the frame count, every touched page is
/// resolvable immediately afterward (property 7, page-fault idempotence),
/// and a page touched again right before the end survives eviction.
#[test]
fn s5_demand_loading_lru_bounds_resident_set_and_is_idempotent() {
    let config = KernelConfig {
        sector_size: 128,
        num_frames: 4,
        user_stack_size: 128 * 8,
        demand_loading: true,
        swap_enabled: true,
        replacement_policy: ReplacementPolicy::Lru,
        ..KernelConfig::default()
    };
    let memory = Memory::new(&config);
    let swap: Arc<dyn SwapBackend> = Arc::new(FakeSwap::new());
    let space = Arc::new(AddressSpace::new(SpaceId::fresh(), Arc::new(ZeroExecutable), &config, 4, Some(swap)).unwrap());
    memory.register_address_space(&space);
    let thread = Scheduler::new(SchedulerKind::Fifo).bootstrap_main_thread();

    for vpn in [1usize, 2, 3, 4, 1, 2, 5, 1, 2, 3, 4, 5] {
        memory.handle_page_fault(&space, &thread, vpn * config.sector_size);
        assert!(
            memory.translate(&space, vpn * config.sector_size).is_some(),
            "page {vpn} must be immediately resolvable right after its own fault"
        );
    }

    let resident_count = (0..space.page_count())
        .filter(|&vpn| memory.translate(&space, vpn * config.sector_size).is_some())
        .count();
    assert!(resident_count <= config.num_frames);

    assert!(memory.translate(&space, 5 * config.sector_size).is_some());
}

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

fn priority_agent(priority: u8) -> Arc<dyn PriorityAgent> {
    Arc::new(TestAgent {
        id: std::thread::current().id(),
        priority: AtomicU8::new(priority),
    })
}

/// S6: priority donation. A low-priority holder (1) keeps a lock while a
/// high-priority waiter (9) blocks on `Acquire`: the holder's priority is
/// raised to 9 for the duration, then restored to 1 the moment it
/// releases.
#[test]
fn s6_priority_donation_round_trips() {
    let lock = Arc::new(Lock::new(true));
    let low = priority_agent(1);
    lock.acquire(&low).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let lock2 = lock.clone();
    let barrier2 = barrier.clone();
    let handle = std::thread::spawn(move || {
        let high = priority_agent(9);
        barrier2.wait();
        lock2.acquire(&high).unwrap();
        lock2.release(&high).unwrap();
    });

    barrier.wait();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(low.priority(), 9);

    lock.release(&low).unwrap();
    assert_eq!(low.priority(), 1);

    handle.join().unwrap();
}
