//! `Exec`'s argument marshalling (`spec.md` §4.5 "Argument marshalling"):
//! `save_args` copies a user-space argv array into the kernel; `write_args`
//! lays the same strings back out on the new process's stack per the MIPS
//! calling convention, grounded in
//! `examples/original_source/userprog/exception.cc`'s `StartProcess`
//! (`WriteArgs`).

use crate::config::ARG_AREA_RESERVATION;
use crate::device::Mmu;

use super::machine::{SimMachine, REG_ARG0, REG_ARG1, REG_STACK};
use super::transfer::{read_string_from_user, write_buffer_to_user};
use super::SyscallError;

/// Longest single argument string this crate will copy in; generous
/// enough for any real argv entry, just a backstop against an unterminated
/// user string looping forever.
const MAX_ARG_LEN: usize = 4096;

/// `SaveArgs`: copies the NUL-terminated array of user pointers at
/// `argv_ptr` (itself terminated by a null pointer) into a kernel `Vec`.
pub fn save_args(machine: &SimMachine, argv_ptr: u64) -> Result<Vec<String>, SyscallError> {
    if argv_ptr == 0 {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    let mut cursor = argv_ptr;
    loop {
        let ptr = read_user_pointer(machine, cursor)?;
        if ptr == 0 {
            break;
        }
        args.push(read_string_from_user(machine, ptr, MAX_ARG_LEN)?);
        cursor += 4;
    }
    Ok(args)
}

/// `WriteArgs`: lays `args` out on the stack below the current stack
/// pointer -- each string, then a zero-terminated array of 4-byte
/// pointers to those strings -- and sets up the calling convention
/// `spec.md` §4.5 describes: argv base in register 5, argc in register 4,
/// stack pointer decremented by `ARG_AREA_RESERVATION` below the argv
/// array.
pub fn write_args(machine: &SimMachine, args: &[String]) -> Result<(), SyscallError> {
    let mut sp = machine.read_register(REG_STACK);

    let mut string_addrs = Vec::with_capacity(args.len());
    for arg in args {
        let bytes = arg.as_bytes();
        sp -= bytes.len() as u64 + 1;
        sp = align_down(sp);
        write_buffer_to_user(machine, sp, bytes)?;
        machine.write_byte(sp + bytes.len() as u64, 0)?;
        string_addrs.push(sp);
    }

    let argv_bytes = (args.len() as u64 + 1) * 4;
    sp -= argv_bytes;
    sp = align_down(sp);
    let argv_base = sp;
    for (i, addr) in string_addrs.iter().enumerate() {
        write_user_pointer(machine, argv_base + i as u64 * 4, *addr as u32)?;
    }
    write_user_pointer(machine, argv_base + args.len() as u64 * 4, 0)?;

    sp = argv_base - ARG_AREA_RESERVATION as u64;
    machine.write_register(REG_STACK, sp);
    machine.write_register(REG_ARG0, args.len() as u64);
    machine.write_register(REG_ARG1, argv_base);
    Ok(())
}

fn align_down(addr: u64) -> u64 {
    addr & !0x3
}

fn read_user_pointer(machine: &SimMachine, addr: u64) -> Result<u64, SyscallError> {
    let mut word = [0u8; 4];
    for (i, byte) in word.iter_mut().enumerate() {
        *byte = machine.read_byte(addr + i as u64)?;
    }
    Ok(u32::from_le_bytes(word) as u64)
}

fn write_user_pointer(machine: &SimMachine, addr: u64, value: u32) -> Result<(), SyscallError> {
    for (i, byte) in value.to_le_bytes().iter().enumerate() {
        machine.write_byte(addr + i as u64, *byte)?;
    }
    Ok(())
}
