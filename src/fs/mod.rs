//! Hierarchical, concurrent file system layered on a raw sector-addressed
//! disk (`spec.md` §4.4). Depends on `sync` and `sched` (open-file
//! concurrency uses `Lock`/`Channel`, callers identify themselves as
//! `Arc<Thread>`) and, for `swap_file`, on `mm::SwapBackend` (dependency
//! inversion keeps `mm` itself from depending upward on `fs`); depended
//! on by `trap`.

mod directory;
mod file_header;
mod file_system;
mod free_map;
mod open_file;
mod swap_file;

pub use file_system::FileSystem;
pub use open_file::OpenFileTable;
pub use swap_file::SwapFile;

use thiserror::Error;

/// Errors raised by the file-system layer. Per `spec.md` §7 these are
/// resource-exhaustion or file-state kinds: reported as a failure return,
/// never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// `Create`/`CreateDir` when `name` already names an in-use entry.
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    /// `Open`/`Remove`/`ChangeDir`/`Find` when `name` has no directory
    /// entry.
    #[error("'{0}' not found")]
    NotFound(String),
    /// `Open` on a name currently in the "removing" state (`spec.md`
    /// §4.4).
    #[error("'{0}' is being removed")]
    Removing(String),
    /// `ChangeDir` into an entry that is not a directory.
    #[error("'{0}' is not a directory")]
    NotADirectory(String),
    /// No clear bit left in the free-sector bitmap.
    #[error("disk is full")]
    DiskFull,
    /// The directory has no room for another entry and cannot grow
    /// further (disk exhaustion during the grow-by-one-entry path).
    #[error("directory is full")]
    DirectoryFull,
    /// A file-descriptor value passed to `Read`/`Write`/`Close`/etc. that
    /// the calling thread does not currently have open.
    #[error("bad file descriptor {0}")]
    BadDescriptor(i32),
    /// `fd` 0 or 1 (console) passed to an operation that only makes sense
    /// on a regular file (`spec.md` §4.5: "never inserted into the
    /// per-thread open-file table").
    #[error("descriptor {0} is a console stream, not a file")]
    ConsoleDescriptor(i32),
}
