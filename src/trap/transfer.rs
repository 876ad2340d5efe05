//! User-memory copy-in/copy-out (`spec.md` §4.5), grounded in
//! `examples/original_source/userprog/transfer.cc`'s
//! `ReadStringFromUser`/`ReadBufferFromUser`/`WriteBufferToUser`: each
//! byte is copied individually through [`SimMachine::read_byte`]/
//! [`SimMachine::write_byte`], which themselves retry through a page
//! fault, so a string or buffer straddling an unmapped page is copied
//! correctly without the caller needing to know that happened.

use crate::config::FILE_NAME_MAX_LEN;

use super::machine::SimMachine;
use super::SyscallError;

/// Copies a NUL-terminated string of at most `max_len` bytes (not
/// counting the terminator) out of user memory.
pub fn read_string_from_user(machine: &SimMachine, ptr: u64, max_len: usize) -> Result<String, SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::NullPointer);
    }
    let mut bytes = Vec::new();
    for i in 0..=max_len {
        let byte = machine.read_byte(ptr + i as u64)?;
        if byte == 0 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.push(byte);
    }
    Err(SyscallError::StringTooLong)
}

/// A path argument, bounded by `FILE_NAME_MAX_LEN` the way every
/// `Create`/`Remove`/`Open`/`ChangeDir` syscall handler in the original
/// bounds its name buffer.
pub fn read_path_from_user(machine: &SimMachine, ptr: u64) -> Result<String, SyscallError> {
    read_string_from_user(machine, ptr, FILE_NAME_MAX_LEN)
}

/// Copies `len` bytes out of user memory into a fresh kernel buffer
/// (`Write`'s `bufPtr`/`n` arguments, `spec.md` §4.5).
pub fn read_buffer_from_user(machine: &SimMachine, ptr: u64, len: usize) -> Result<Vec<u8>, SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::NullPointer);
    }
    let mut buf = Vec::with_capacity(len);
    for i in 0..len {
        buf.push(machine.read_byte(ptr + i as u64)?);
    }
    Ok(buf)
}

/// Copies `data` into user memory at `ptr` (`Read`'s `bufPtr` argument;
/// `LsDir`'s listing buffer).
pub fn write_buffer_to_user(machine: &SimMachine, ptr: u64, data: &[u8]) -> Result<(), SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::NullPointer);
    }
    for (i, byte) in data.iter().enumerate() {
        machine.write_byte(ptr + i as u64, *byte)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::device::Executable;
    use crate::mm::{AddressSpace, Memory};
    use crate::sched::{Scheduler, SpaceId};
    use std::sync::Arc;

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
        let machine = SimMachine::new(memory, space, thread);
        machine.init_registers(1024);
        machine
    }

    #[test]
    fn buffer_round_trips_across_a_page_boundary() {
        let machine = harness();
        // Straddles the vpn0/vpn1 boundary at byte 128.
        let data: Vec<u8> = (0..20).collect();
        write_buffer_to_user(&machine, 120, &data).unwrap();
        assert_eq!(read_buffer_from_user(&machine, 120, 20).unwrap(), data);
    }

    #[test]
    fn string_reads_up_to_its_nul_terminator() {
        let machine = harness();
        write_buffer_to_user(&machine, 0, b"hi\0garbage").unwrap();
        assert_eq!(read_string_from_user(&machine, 0, 63).unwrap(), "hi");
    }

    #[test]
    fn string_without_a_terminator_within_max_len_errors() {
        let machine = harness();
        let long = vec![b'x'; 10];
        write_buffer_to_user(&machine, 0, &long).unwrap();
        assert_eq!(read_string_from_user(&machine, 0, 4).unwrap_err(), SyscallError::StringTooLong);
    }

    #[test]
    fn a_null_pointer_is_rejected_before_touching_memory() {
        let machine = harness();
        assert_eq!(read_string_from_user(&machine, 0, 63).unwrap_err(), SyscallError::NullPointer);
        assert_eq!(write_buffer_to_user(&machine, 0, b"x").unwrap_err(), SyscallError::NullPointer);
    }
}
