//! The simulated machine's register file and the `device::Mmu`
//! implementation the trap dispatcher drives (`spec.md` §4.5, §6 "CPU
//! simulator"). The instruction fetch/decode/execute loop itself
//! (`Machine::Run`) is out of scope (`spec.md` §1) -- what lives here is
//! exactly the register convention and the retrying virtual-memory copy
//! primitives a syscall handler needs regardless of who drives `Run`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::device::Mmu;
use crate::mm::{AddressSpace, Memory};
use crate::sched::Thread;

use super::SyscallError;

/// Register count, matching the simulated MIPS machine's 32 general
/// registers plus the handful of special-purpose ones the original
/// `Machine` class exposes (`NumTotalRegs`).
pub const NUM_REGISTERS: usize = 40;

/// Register 2: syscall id on entry, return value on exit (`spec.md`
/// §4.5).
pub const REG_RESULT: usize = 2;
pub const REG_ARG0: usize = 4;
pub const REG_ARG1: usize = 5;
pub const REG_ARG2: usize = 6;
pub const REG_ARG3: usize = 7;
/// Stack pointer, decremented by `config::ARG_AREA_RESERVATION` below the
/// argument area at process start (`spec.md` §4.5).
pub const REG_STACK: usize = 29;
pub const REG_PREV_PC: usize = 33;
pub const REG_PC: usize = 34;
pub const REG_NEXT_PC: usize = 35;

/// Bounded retries for a user-memory access that faults mid-copy
/// (`examples/original_source/userprog/transfer.cc`'s `NUMBER_OF_TRIES`):
/// each retry services exactly one page fault, so more than a couple of
/// retries would only be needed under eviction races this single-threaded
/// dispatch loop does not create.
const NUMBER_OF_TRIES: u32 = 3;

/// The simulated register file: plain atomics rather than a `Mutex<[u64;
/// N]>` since the syscall dispatcher and (conceptually) an interrupt
/// handler may touch individual registers without serializing on a single
/// lock.
struct Registers([AtomicU64; NUM_REGISTERS]);

impl Registers {
    fn new() -> Self {
        Self(std::array::from_fn(|_| AtomicU64::new(0)))
    }

    fn read(&self, reg: usize) -> u64 {
        self.0[reg].load(Ordering::SeqCst)
    }

    fn write(&self, reg: usize, value: u64) {
        self.0[reg].store(value, Ordering::SeqCst);
    }
}

/// A running process's simulated machine state: its register file, and
/// the memory/address-space/thread triple needed to translate and
/// service faults on its behalf.
pub struct SimMachine {
    registers: Registers,
    memory: Arc<Memory>,
    address_space: Arc<AddressSpace>,
    thread: Arc<Thread>,
}

impl SimMachine {
    pub fn new(memory: Arc<Memory>, address_space: Arc<AddressSpace>, thread: Arc<Thread>) -> Self {
        Self {
            registers: Registers::new(),
            memory,
            address_space,
            thread,
        }
    }

    /// Sets up the register file for a freshly `Exec`'d program: entry
    /// point at virtual address 0 (the NOFF convention), the stack
    /// pointer at `stack_top`, and `NEXT_PC` one instruction ahead of
    /// `PC` so the first `advance_pc` call behaves exactly like every
    /// subsequent one.
    pub fn init_registers(&self, stack_top: u64) {
        for reg in 0..NUM_REGISTERS {
            self.registers.write(reg, 0);
        }
        self.registers.write(REG_PC, 0);
        self.registers.write(REG_NEXT_PC, 4);
        self.registers.write(REG_STACK, stack_top);
    }

    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.address_space
    }

    pub fn thread(&self) -> &Arc<Thread> {
        &self.thread
    }

    /// Reads one byte of user memory at `vaddr`, servicing page faults as
    /// needed (`spec.md` §4.5: "via the MMU translator with retry").
    pub fn read_byte(&self, vaddr: u64) -> Result<u8, SyscallError> {
        let offset = self.resolve(vaddr)?;
        Ok(self.memory.read_phys(offset))
    }

    /// Writes one byte of user memory at `vaddr`, servicing page faults
    /// as needed.
    pub fn write_byte(&self, vaddr: u64, value: u8) -> Result<(), SyscallError> {
        let offset = self.resolve(vaddr)?;
        self.memory.write_phys(offset, value);
        Ok(())
    }

    fn resolve(&self, vaddr: u64) -> Result<usize, SyscallError> {
        for _ in 0..NUMBER_OF_TRIES {
            if let Some(offset) = self.memory.translate(&self.address_space, vaddr as usize) {
                return Ok(offset);
            }
            self.memory
                .handle_page_fault(&self.address_space, &self.thread, vaddr as usize);
        }
        self.memory
            .translate(&self.address_space, vaddr as usize)
            .ok_or(SyscallError::BadPointer)
    }
}

impl Mmu for SimMachine {
    fn translate(&self, vaddr: u64) -> Option<usize> {
        self.memory.translate(&self.address_space, vaddr as usize)
    }

    fn advance_pc(&self) {
        let pc = self.registers.read(REG_PC);
        let next = self.registers.read(REG_NEXT_PC);
        self.registers.write(REG_PREV_PC, pc);
        self.registers.write(REG_PC, next);
        self.registers.write(REG_NEXT_PC, next + 4);
    }

    fn read_register(&self, reg: usize) -> u64 {
        self.registers.read(reg)
    }

    fn write_register(&self, reg: usize, value: u64) {
        self.registers.write(reg, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::device::Executable;
    use crate::sched::{Scheduler, SpaceId};

    struct NoCodeExecutable;

    impl Executable for NoCodeExecutable {
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

    fn harness() -> SimMachine {
        let config = KernelConfig {
            sector_size: 128,
            num_frames: 8,
            user_stack_size: 1024,
            demand_loading: true,
            swap_enabled: false,
            tlb_size: 4,
            ..KernelConfig::default()
        };
        let memory = Arc::new(Memory::new(&config));
        let executable: Arc<dyn Executable + Send + Sync> = Arc::new(NoCodeExecutable);
        let space = Arc::new(AddressSpace::new(SpaceId::fresh(), executable, &config, config.tlb_size, None).unwrap());
        memory.register_address_space(&space);
        let thread = Scheduler::new(crate::config::SchedulerKind::Fifo).bootstrap_main_thread();
        SimMachine::new(memory, space, thread)
    }

    #[test]
    fn init_registers_sets_pc_next_pc_and_the_stack_pointer() {
        let machine = harness();
        machine.init_registers(4096);
        assert_eq!(machine.read_register(REG_PC), 0);
        assert_eq!(machine.read_register(REG_NEXT_PC), 4);
        assert_eq!(machine.read_register(REG_STACK), 4096);
    }

    #[test]
    fn advance_pc_shifts_prev_pc_and_next_pc_forward_by_one_instruction() {
        let machine = harness();
        machine.init_registers(0);
        machine.advance_pc();
        assert_eq!(machine.read_register(REG_PREV_PC), 0);
        assert_eq!(machine.read_register(REG_PC), 4);
        assert_eq!(machine.read_register(REG_NEXT_PC), 8);

        machine.advance_pc();
        assert_eq!(machine.read_register(REG_PREV_PC), 4);
        assert_eq!(machine.read_register(REG_PC), 8);
        assert_eq!(machine.read_register(REG_NEXT_PC), 12);
    }

    #[test]
    fn write_byte_then_read_byte_round_trips_through_a_demand_fault() {
        let machine = harness();
        machine.init_registers(1024);
        machine.write_byte(50, 0x42).unwrap();
        assert_eq!(machine.read_byte(50).unwrap(), 0x42);
    }

    #[test]
    fn translate_resolves_to_the_same_offset_read_byte_used() {
        let machine = harness();
        machine.init_registers(1024);
        machine.write_byte(10, 7).unwrap();
        let offset = Mmu::translate(&machine, 10).unwrap();
        assert_eq!(machine.read_byte(10).unwrap(), 7);
        assert_eq!(Mmu::translate(&machine, 10).unwrap(), offset);
    }
}
