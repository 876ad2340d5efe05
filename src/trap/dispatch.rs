//! The trap dispatcher (`spec.md` §4.5): the syscall surface itself, and
//! the `Exec` handler that ties `mm`/`fs`/`sched` together to start a new
//! process.
//!
//! The simulated CPU's fetch/decode/execute loop (`Machine::Run`) is out
//! of scope (`spec.md` §1); [`ProgramRunner`] stands in for it so this
//! layer's actual, in-scope responsibilities -- address-space
//! construction, register/argument setup, and syscall handling itself --
//! stay fully real and testable without this crate pretending to
//! interpret MIPS instructions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::KernelConfig;
use crate::device::{Console, Executable, Mmu, NoffExecutable};
use crate::errors::fatal;
use crate::fs::{FileSystem, SwapFile};
use crate::mm::{AddressSpace, Memory};
use crate::sched::{Scheduler, SpaceId, Thread, ThreadStatus};
use crate::sync::PriorityAgent;

use super::args;
use super::machine::{SimMachine, REG_ARG0, REG_ARG1, REG_ARG2, REG_ARG3, REG_RESULT};
use super::transfer;

/// The syscall surface `spec.md` §4.5 names, in register-2 id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallId {
    Halt,
    Exit,
    Exec,
    Join,
    Create,
    Remove,
    Open,
    Close,
    Read,
    Write,
    LsDir,
    Cd,
}

impl SyscallId {
    pub fn from_u64(id: u64) -> Self {
        match id {
            0 => Self::Halt,
            1 => Self::Exit,
            2 => Self::Exec,
            3 => Self::Join,
            4 => Self::Create,
            5 => Self::Remove,
            6 => Self::Open,
            7 => Self::Close,
            8 => Self::Read,
            9 => Self::Write,
            10 => Self::LsDir,
            11 => Self::Cd,
            _ => fatal("unknown syscall id"),
        }
    }
}

/// Stands in for `machine->Run()` (`spec.md` §9 "Exception-like control
/// flow"): drives whatever canned or interactive instruction stream a
/// caller supplies, calling back into [`Dispatcher::handle_syscall`]
/// whenever that stream raises a syscall exception. Returns once the
/// program has no more work to do (after `Halt`/`Exit`, or when the
/// supplied instruction stream is exhausted).
pub trait ProgramRunner: Send + Sync {
    fn run(&self, dispatcher: &Arc<Dispatcher>, thread: &Arc<Thread>, machine: &SimMachine);
}

/// Caps how much of a `LsDir` listing is copied into the caller's buffer.
/// The syscall's signature (`spec.md` §4.5: `LsDir(bufPtr)`) carries no
/// length argument, unlike `Read`/`Write`; this crate bounds the write at
/// a fixed size rather than writing an unbounded amount into user memory
/// (see `DESIGN.md`).
const LS_DIR_BUFFER_CAP: usize = 4096;

/// Ties the scheduler, memory manager, file system, and console together
/// behind the syscall surface, and owns the table of currently-running
/// processes `Join` looks callers up in.
pub struct Dispatcher {
    config: KernelConfig,
    scheduler: Arc<Scheduler>,
    memory: Arc<Memory>,
    fs: Arc<FileSystem>,
    console: Arc<dyn Console>,
    runner: Arc<dyn ProgramRunner>,
    halted: AtomicBool,
    processes: spin::Mutex<BTreeMap<SpaceId, Arc<Thread>>>,
}

impl Dispatcher {
    pub fn new(
        config: KernelConfig,
        scheduler: Arc<Scheduler>,
        memory: Arc<Memory>,
        fs: Arc<FileSystem>,
        console: Arc<dyn Console>,
        runner: Arc<dyn ProgramRunner>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            scheduler,
            memory,
            fs,
            console,
            runner,
            halted: AtomicBool::new(false),
            processes: spin::Mutex::new(BTreeMap::new()),
        })
    }

    /// Whether `Halt` has been called. The demo binary uses this to
    /// decide when to stop pumping the console loop; shutting the
    /// process down itself is bootstrap plumbing out of scope here.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Services one syscall exception: reads the id and arguments out of
    /// the register file, dispatches, writes the result back into
    /// register 2, then advances the program counter (`spec.md` §4.5).
    pub fn handle_syscall(self: &Arc<Self>, thread: &Arc<Thread>, machine: &SimMachine) {
        let id = SyscallId::from_u64(machine.read_register(REG_RESULT));
        let a0 = machine.read_register(REG_ARG0);
        let a1 = machine.read_register(REG_ARG1);
        let a2 = machine.read_register(REG_ARG2);
        let a3 = machine.read_register(REG_ARG3);

        #[cfg(feature = "syscall_trace")]
        log::trace!(
            "space {}: {id:?}(a0={a0}, a1={a1}, a2={a2}, a3={a3})",
            thread.space_id().as_u64()
        );

        let result = self.execute(id, thread, machine, a0, a1, a2, a3);

        #[cfg(feature = "syscall_trace")]
        log::trace!("space {}: {id:?} -> {result}", thread.space_id().as_u64());

        machine.write_register(REG_RESULT, result as u64);
        machine.advance_pc();
    }

    fn execute(
        self: &Arc<Self>,
        id: SyscallId,
        thread: &Arc<Thread>,
        machine: &SimMachine,
        a0: u64,
        a1: u64,
        a2: u64,
        _a3: u64,
    ) -> i64 {
        match id {
            SyscallId::Halt => {
                self.halted.store(true, Ordering::SeqCst);
                0
            }
            SyscallId::Exit => {
                thread.finish(a0 as i64);
                0
            }
            SyscallId::Exec => {
                let path = match transfer::read_path_from_user(machine, a0) {
                    Ok(path) => path,
                    Err(_) => return -1,
                };
                let exec_args = match args::save_args(machine, a1) {
                    Ok(args) => args,
                    Err(_) => return -1,
                };
                self.exec(thread, &path, &exec_args, a2 != 0)
            }
            SyscallId::Join => self.join(thread, a0),
            SyscallId::Create => self.handle_create(thread, machine, a0, a1),
            SyscallId::Remove => self.handle_remove(thread, machine, a0),
            SyscallId::Open => self.handle_open(thread, machine, a0),
            SyscallId::Close => self.handle_close(thread, a0),
            SyscallId::Read => self.handle_read(thread, machine, a0, a1, a2),
            SyscallId::Write => self.handle_write(thread, machine, a0, a1, a2),
            SyscallId::LsDir => self.handle_ls_dir(thread, machine, a0),
            SyscallId::Cd => self.handle_cd(thread, machine, a0),
        }
    }

    /// `Exec(pathPtr, argvPtr, joinable) -> SpaceId` (`spec.md` §4.5),
    /// also the entry point the demo binary's `-x` flag calls directly
    /// without going through a simulated syscall exception.
    ///
    /// Everything that can fail -- the host file open, the executable's
    /// magic check, eager-loading's frame allocation, and (when enabled)
    /// the swap file's creation -- happens synchronously on the calling
    /// thread, so a failure can still be reported as the `-1` sentinel
    /// (`spec.md` §7) before any new thread is forked. Only the parts
    /// that must run as the new process -- register initialization,
    /// argument layout, and driving the program itself -- happen inside
    /// the forked closure.
    pub fn exec(self: &Arc<Self>, caller: &Arc<Thread>, path: &str, args: &[String], joinable: bool) -> i64 {
        let full_path = Path::new(&self.config.program_dir).join(path);
        let executable: Arc<dyn Executable + Send + Sync> = match NoffExecutable::open(&full_path) {
            Ok(exe) => Arc::new(exe),
            Err(_) => return -1,
        };

        let space_id = SpaceId::fresh();
        let space = match AddressSpace::new(space_id, executable, &self.config, self.config.tlb_size, None) {
            Ok(space) => Arc::new(space),
            Err(_) => return -1,
        };

        if self.config.demand_loading {
            self.memory.register_address_space(&space);
        } else if self.memory.load_eagerly(&space).is_err() {
            return -1;
        }

        if self.config.swap_enabled {
            match SwapFile::create(self.fs.clone(), caller.clone(), space.page_count(), self.config.sector_size) {
                Ok(swap) => space.set_swap(swap),
                Err(_) => {
                    self.memory.destroy_address_space(&space);
                    return -1;
                }
            }
        }

        let stack_top = (space.page_count() * self.config.sector_size) as u64;
        let owned_args = args.to_vec();
        let dispatcher = self.clone();
        let space_for_thread = space.clone();
        let priority = caller.priority();
        let name = format!("exec:{path}");

        let child = self.scheduler.fork(name, priority, joinable, space_id, move |child_thread| {
            let machine = SimMachine::new(dispatcher.memory.clone(), space_for_thread.clone(), child_thread.clone());
            machine.init_registers(stack_top);

            if args::write_args(&machine, &owned_args).is_ok() {
                dispatcher.runner.run(&dispatcher, child_thread, &machine);
            }

            if child_thread.status() != ThreadStatus::Blocked {
                child_thread.finish(0);
            }
            dispatcher.memory.destroy_address_space(&space_for_thread);
        });

        self.processes.lock().insert(space_id, child);
        space_id.as_u64() as i64
    }

    /// `Join(spaceId) -> status`. A `spaceId` with no registered process
    /// (never forked, or already joined) is reported as `-1` rather than
    /// blocking forever -- an extension of the `-1`/handle-call sentinel
    /// convention to this call's otherwise-unbounded status range (see
    /// `DESIGN.md`).
    pub fn join(&self, caller: &Arc<Thread>, space_id_raw: u64) -> i64 {
        let space_id = SpaceId::from_raw(space_id_raw);
        let target = self.processes.lock().remove(&space_id);
        match target {
            Some(thread) => {
                let agent: Arc<dyn PriorityAgent> = caller.clone();
                thread.join(&agent)
            }
            None => -1,
        }
    }

    fn handle_create(&self, thread: &Arc<Thread>, machine: &SimMachine, path_ptr: u64, is_dir: u64) -> i64 {
        let path = match transfer::read_path_from_user(machine, path_ptr) {
            Ok(path) => path,
            Err(_) => return 1,
        };
        let caller: Arc<dyn PriorityAgent> = thread.clone();
        match self.fs.create(&caller, thread, &path, is_dir != 0) {
            Ok(_) => 0,
            Err(_) => 1,
        }
    }

    fn handle_remove(&self, thread: &Arc<Thread>, machine: &SimMachine, path_ptr: u64) -> i64 {
        let path = match transfer::read_path_from_user(machine, path_ptr) {
            Ok(path) => path,
            Err(_) => return 1,
        };
        let caller: Arc<dyn PriorityAgent> = thread.clone();
        match self.fs.remove(&caller, thread, &path) {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }

    fn handle_open(&self, thread: &Arc<Thread>, machine: &SimMachine, path_ptr: u64) -> i64 {
        let path = match transfer::read_path_from_user(machine, path_ptr) {
            Ok(path) => path,
            Err(_) => return -1,
        };
        match self.fs.open(thread, &path) {
            Ok(fd) => fd as i64,
            Err(_) => -1,
        }
    }

    fn handle_close(&self, thread: &Arc<Thread>, fd: u64) -> i64 {
        let caller: Arc<dyn PriorityAgent> = thread.clone();
        match self.fs.close(&caller, thread, fd as i32) {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }

    /// `Read(bufPtr, n, fd) -> n`. Console input (`fd == 0`) is read
    /// character-by-character from the console device rather than routed
    /// through the file system (`spec.md` §4.5: "`fd` values 0 and 1 ...
    /// are never inserted into the per-thread open-file table").
    fn handle_read(&self, thread: &Arc<Thread>, machine: &SimMachine, buf_ptr: u64, count: u64, fd: u64) -> i64 {
        let len = count as usize;
        let fd = fd as i32;

        if fd == 0 {
            let bytes: Vec<u8> = (0..len).map(|_| self.console.read_char()).collect();
            return match transfer::write_buffer_to_user(machine, buf_ptr, &bytes) {
                Ok(()) => len as i64,
                Err(_) => 0,
            };
        }

        let mut buf = vec![0u8; len];
        let n = match self.fs.read(thread, fd, &mut buf) {
            Ok(n) => n,
            Err(_) => return 0,
        };
        match transfer::write_buffer_to_user(machine, buf_ptr, &buf[..n]) {
            Ok(()) => n as i64,
            Err(_) => 0,
        }
    }

    /// `Write(bufPtr, n, fd) -> n`. Console output (`fd == 1`) writes
    /// character-by-character to the console device.
    fn handle_write(&self, thread: &Arc<Thread>, machine: &SimMachine, buf_ptr: u64, count: u64, fd: u64) -> i64 {
        let len = count as usize;
        let fd = fd as i32;

        let buf = match transfer::read_buffer_from_user(machine, buf_ptr, len) {
            Ok(buf) => buf,
            Err(_) => return 0,
        };

        if fd == 1 {
            for byte in &buf {
                self.console.write_char(*byte);
            }
            return buf.len() as i64;
        }

        let caller: Arc<dyn PriorityAgent> = thread.clone();
        match self.fs.write(&caller, thread, fd, &buf) {
            Ok(n) => n as i64,
            Err(_) => 0,
        }
    }

    fn handle_ls_dir(&self, thread: &Arc<Thread>, machine: &SimMachine, buf_ptr: u64) -> i64 {
        let mut out = Vec::new();
        for name in self.fs.ls_dir(thread) {
            if out.len() + name.len() + 1 >= LS_DIR_BUFFER_CAP {
                break;
            }
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
        }
        out.push(0);

        match transfer::write_buffer_to_user(machine, buf_ptr, &out) {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }

    fn handle_cd(&self, thread: &Arc<Thread>, machine: &SimMachine, path_ptr: u64) -> i64 {
        let path = match transfer::read_path_from_user(machine, path_ptr) {
            Ok(path) => path,
            Err(_) => return 1,
        };
        match self.fs.change_dir(thread, &path) {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }
}
