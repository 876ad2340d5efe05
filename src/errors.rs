//! Crate-wide error type.
//!
//! Mirrors the teacher kernel's `kernel::core::result::KernelError` (a kind
//! plus optional static context string), but derives `Display`/`Error` with
//! `thiserror` instead of a hand-written `fmt::Display` match arm per kind.

use thiserror::Error;

use crate::fs::FsError;
use crate::mm::MemError;
use crate::sync::SyncError;
use crate::trap::SyscallError;

/// Crate-wide result alias.
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level kernel error.
///
/// Per §7 of the specification, only the `Assertion` variant is fatal --
/// every other variant is a value returned to a caller, never a panic.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A synchronization-layer error (lock misuse, joining a non-joinable
    /// thread, etc).
    #[error("synchronization error: {0}")]
    Sync(#[from] SyncError),

    /// A memory/address-space error (no free frame, fault outside the
    /// program's address space, ...).
    #[error("memory error: {0}")]
    Memory(#[from] MemError),

    /// A file-system error (no free sector, name collision, remove while
    /// open, ...).
    #[error("file system error: {0}")]
    FileSystem(#[from] FsError),

    /// A syscall-argument error (bad user pointer, oversize string, ...).
    #[error("syscall error: {0}")]
    Syscall(#[from] SyscallError),

    /// A broken kernel invariant. Per §7, this kind is the only one that is
    /// ever allowed to abort the process; callers should not attempt to
    /// recover from it.
    #[error("kernel invariant violated: {0}")]
    Assertion(&'static str),
}

/// Panics with a formatted message, used at the handful of call sites where
/// `spec.md` §7 calls out a broken invariant as fatal ("assertion ...
/// aborts the kernel"). Kept as a named helper (rather than a bare
/// `panic!`) so those sites read as deliberate policy, not accidental
/// unwraps.
#[track_caller]
pub fn fatal(msg: &'static str) -> ! {
    panic!("kernel assertion failed: {msg}");
}
