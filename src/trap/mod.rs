//! Trap/syscall dispatch (`spec.md` §4.5): turns a simulated MIPS syscall
//! exception into a call on the three layers below, then writes the
//! result back into register 2 and advances the program counter. Depends
//! on `sync`, `sched`, `mm`, and `fs`; this is the top of the layer
//! stack (`spec.md` §2).

mod args;
mod dispatch;
mod machine;
mod transfer;

pub use dispatch::{Dispatcher, ProgramRunner, SyscallId};
pub use machine::{
    SimMachine, NUM_REGISTERS, REG_ARG0, REG_ARG1, REG_ARG2, REG_ARG3, REG_NEXT_PC, REG_PC,
    REG_PREV_PC, REG_RESULT, REG_STACK,
};

use thiserror::Error;

/// Errors raised while marshalling syscall arguments across the
/// user/kernel boundary. Per `spec.md` §7 these are the "syscall-argument"
/// error kind: never fatal, always resolved into the syscall's dedicated
/// failure sentinel by the dispatcher rather than propagated as a panic.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// A user pointer argument was null where a pointer was required.
    #[error("null user pointer")]
    NullPointer,
    /// A user pointer did not resolve to a valid translation even after
    /// the bounded number of page-fault-and-retry attempts (`spec.md`
    /// §4.5, "with retry").
    #[error("user pointer did not resolve to a valid page")]
    BadPointer,
    /// A user-supplied string exceeded `FILE_NAME_MAX_LEN` without a
    /// terminating NUL.
    #[error("user string exceeded the maximum path length")]
    StringTooLong,
    /// A negative or otherwise nonsensical byte count.
    #[error("bad byte count in syscall argument")]
    BadByteCount,
    /// `Join` named a `SpaceId` with no corresponding live (or ever
    /// forked) process.
    #[error("no such process")]
    NoSuchProcess,
}
