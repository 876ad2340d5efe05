//! Per-process swap file (`spec.md` §4.3 "Construction" step 5, §3
//! "swap file"), grounded in
//! `examples/original_source/userprog/address_space.cc`'s
//! `fileSystem->Create("userprog/SWAP/SWAP.%d", ...)` followed by an
//! `Open` of the same name -- here the kernel's own hierarchical
//! `FileSystem` is the backing store, not the host file system.

use std::sync::Arc;

use crate::mm::SwapBackend;
use crate::sched::Thread;
use crate::sync::PriorityAgent;

use super::{FileSystem, FsError};

/// A process's owned swap file, implementing [`SwapBackend`] for the
/// memory layer's eviction path.
pub struct SwapFile {
    fs: Arc<FileSystem>,
    owner: Arc<Thread>,
    fd: i32,
    page_size: usize,
}

impl SwapFile {
    /// Creates and zero-fills a swap file sized for `page_count` pages,
    /// named from the owning `SpaceId` (`spec.md` §3: "an owned swap
    /// file"). Zero-filling up front means later `read_page`/`write_page`
    /// calls land within the file's already-allocated chain, since
    /// `FileSystem::write_at` never grows it (`spec.md` §4.4
    /// `WriteAt`).
    pub fn create(
        fs: Arc<FileSystem>,
        owner: Arc<Thread>,
        page_count: usize,
        page_size: usize,
    ) -> Result<Arc<Self>, FsError> {
        let name = format!("swap.{}", owner.space_id().as_u64());
        let caller: Arc<dyn PriorityAgent> = owner.clone();

        fs.create(&caller, &owner, &name, false)?;
        let fd = fs.open(&owner, &name)?;

        let zeros = vec![0u8; page_size];
        for _ in 0..page_count {
            fs.write(&caller, &owner, fd, &zeros)?;
        }

        Ok(Arc::new(Self {
            fs,
            owner,
            fd,
            page_size,
        }))
    }

    fn caller(&self) -> Arc<dyn PriorityAgent> {
        self.owner.clone()
    }
}

impl SwapBackend for SwapFile {
    fn read_page(&self, vpn: usize, buf: &mut [u8]) {
        let position = vpn * self.page_size;
        let n = self
            .fs
            .read_at(&self.owner, self.fd, buf, position)
            .expect("swap-in read should not fail on a pre-sized swap file");
        debug_assert_eq!(n, buf.len(), "short read from swap file");
    }

    fn write_page(&self, vpn: usize, buf: &[u8]) {
        let position = vpn * self.page_size;
        let caller = self.caller();
        self.fs
            .write_at(&caller, &self.owner, self.fd, buf, position)
            .expect("swap-out write should not fail on a pre-sized swap file");
    }
}

impl Drop for SwapFile {
    fn drop(&mut self) {
        let caller = self.caller();
        let _ = self.fs.close(&caller, &self.owner, self.fd);
    }
}
