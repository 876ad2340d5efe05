//! The file-system singleton (`spec.md` §4.4): ties the free-sector
//! bitmap, the hierarchical directory tree, and the open-file table
//! together into the `Create`/`Open`/`Close`/`Read`/`Write`/`Remove`/
//! `ChangeDir`/`LsDir` surface the trap dispatcher calls into, grounded in
//! `examples/original_source/filesys/file_system.cc`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{KernelConfig, FREE_MAP_SECTOR, NUM_DIR_ENTRIES, ROOT_DIRECTORY_SECTOR};
use crate::device::Disk;
use crate::sched::{OpenFileHandle, SpaceId, Thread};
use crate::sync::PriorityAgent;
use crate::sync::Lock;

use super::directory::Directory;
use super::file_header::{self, FileHeader};
use super::free_map::FreeSectorBitmap;
use super::open_file::OpenFileTable;
use super::FsError;

/// The file system singleton (`spec.md` §9 "Globals": "the ... file-system
/// singleton ... are process-wide").
pub struct FileSystem {
    disk: Arc<dyn Disk>,
    config: KernelConfig,
    free_map: spin::Mutex<FreeSectorBitmap>,
    /// The global "file system create" lock serializing `Create`/
    /// `CreateDir` against each other (`spec.md` §5 "Shared resources").
    create_lock: Lock,
    open_files: OpenFileTable,
    /// Per-process current-directory sector, defaulting to the root
    /// (`spec.md` §3 "Thread": a per-process table, here keyed by
    /// `SpaceId` rather than embedded in `sched::Thread` so the
    /// scheduler layer stays independent of `fs` -- see `DESIGN.md`).
    current_dirs: spin::Mutex<BTreeMap<SpaceId, u32>>,
}

impl FileSystem {
    /// Opens an already-formatted disk: reads the free-sector bitmap off
    /// `FREE_MAP_SECTOR` (`spec.md` §6).
    pub fn new(disk: Arc<dyn Disk>, config: KernelConfig) -> Self {
        let free_map = FreeSectorBitmap::fetch_from(disk.as_ref(), &config, FREE_MAP_SECTOR);
        Self {
            disk,
            config,
            free_map: spin::Mutex::new(free_map),
            create_lock: Lock::new(false),
            open_files: OpenFileTable::new(),
            current_dirs: spin::Mutex::new(BTreeMap::new()),
        }
    }

    /// `spec.md` §6 "Persisted state layout": initializes a blank disk --
    /// marks sectors 0 and 1 permanently allocated, gives the free map and
    /// the root directory their initial on-disk capacity, and persists
    /// both.
    pub fn format(disk: Arc<dyn Disk>, config: KernelConfig) -> Self {
        let mut free_map = FreeSectorBitmap::new(config.num_sectors);
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIRECTORY_SECTOR);

        FileHeader::empty().write_back(disk.as_ref(), FREE_MAP_SECTOR, config.num_direct());
        FileHeader::empty().write_back(disk.as_ref(), ROOT_DIRECTORY_SECTOR, config.num_direct());

        let zeros = vec![0u8; free_map.packed_byte_len()];
        file_header::write_with_growth(disk.as_ref(), &config, &mut free_map, FREE_MAP_SECTOR, &zeros, 0)
            .expect("formatting a blank disk cannot exhaust the free map");

        let root = Directory::new(NUM_DIR_ENTRIES);
        root.write_back(disk.as_ref(), &config, &mut free_map, ROOT_DIRECTORY_SECTOR);

        free_map.write_back(disk.as_ref(), &config, FREE_MAP_SECTOR);

        Self {
            disk,
            config,
            free_map: spin::Mutex::new(free_map),
            create_lock: Lock::new(false),
            open_files: OpenFileTable::new(),
            current_dirs: spin::Mutex::new(BTreeMap::new()),
        }
    }

    /// The configuration this file system was built with (sector size,
    /// `NUM_DIRECT`, ...).
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn current_dir_sector(&self, thread: &Arc<Thread>) -> u32 {
        *self
            .current_dirs
            .lock()
            .entry(thread.space_id())
            .or_insert(ROOT_DIRECTORY_SECTOR)
    }

    /// `Create(name, isDir)` (`spec.md` §4.4).
    pub fn create(
        &self,
        caller: &Arc<dyn PriorityAgent>,
        thread: &Arc<Thread>,
        name: &str,
        is_dir: bool,
    ) -> Result<u32, FsError> {
        self.create_lock.acquire(caller).expect("create lock");
        let result = self.create_locked(thread, name, is_dir);
        self.create_lock.release(caller).expect("create lock");
        result
    }

    fn create_locked(&self, thread: &Arc<Thread>, name: &str, is_dir: bool) -> Result<u32, FsError> {
        let dir_sector = self.current_dir_sector(thread);
        let mut dir = Directory::fetch_from(self.disk.as_ref(), &self.config, dir_sector);
        if dir.find(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let mut free_map = self.free_map.lock();
        let sector = free_map.find().ok_or(FsError::DiskFull)?;
        FileHeader::empty().write_back(self.disk.as_ref(), sector, self.config.num_direct());

        if !dir.add(name, sector, is_dir) {
            free_map.clear(sector);
            return Err(FsError::DirectoryFull);
        }

        // `CreateDir` additionally seeds the new directory's own initial
        // capacity (`spec.md` §4.4 "Directory creation").
        if is_dir {
            let sub = Directory::new(NUM_DIR_ENTRIES);
            sub.write_back(self.disk.as_ref(), &self.config, &mut free_map, sector);
        }

        free_map.write_back(self.disk.as_ref(), &self.config, FREE_MAP_SECTOR);
        let persisted = dir.write_back(self.disk.as_ref(), &self.config, &mut free_map, dir_sector);
        free_map.write_back(self.disk.as_ref(), &self.config, FREE_MAP_SECTOR);
        drop(free_map);

        if !persisted {
            return Err(FsError::DiskFull);
        }

        self.open_files.reinit(sector);
        Ok(sector)
    }

    /// `CreateDir` (`spec.md` §4.4): identical to `Create` with
    /// `is_dir = true`.
    pub fn create_dir(
        &self,
        caller: &Arc<dyn PriorityAgent>,
        thread: &Arc<Thread>,
        name: &str,
    ) -> Result<u32, FsError> {
        self.create(caller, thread, name, true)
    }

    /// `Open(name)` (`spec.md` §4.4): looks up `name` in the caller's
    /// current directory, refuses if the entry is being removed, and
    /// registers a new handle in the caller's per-thread open-file table.
    pub fn open(&self, thread: &Arc<Thread>, name: &str) -> Result<i32, FsError> {
        let dir_sector = self.current_dir_sector(thread);
        let dir = Directory::fetch_from(self.disk.as_ref(), &self.config, dir_sector);
        let sector = dir.find(name).ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let entry = self.open_files.get_or_create(sector);
        if entry.is_removing() {
            return Err(FsError::Removing(name.to_string()));
        }
        entry.register_open();

        let handle = Arc::new(OpenFileHandle::new(sector));
        let fd = thread.open_files().lock().add(handle) as i32;
        Ok(fd)
    }

    fn handle_for(&self, thread: &Arc<Thread>, fd: i32) -> Result<Arc<OpenFileHandle>, FsError> {
        if fd == 0 || fd == 1 {
            return Err(FsError::ConsoleDescriptor(fd));
        }
        thread
            .open_files()
            .lock()
            .get(fd as usize)
            .cloned()
            .ok_or(FsError::BadDescriptor(fd))
    }

    /// `Close(fd)`.
    pub fn close(&self, caller: &Arc<dyn PriorityAgent>, thread: &Arc<Thread>, fd: i32) -> Result<(), FsError> {
        if fd == 0 || fd == 1 {
            return Err(FsError::ConsoleDescriptor(fd));
        }
        let handle = thread
            .open_files()
            .lock()
            .remove(fd as usize)
            .ok_or(FsError::BadDescriptor(fd))?;
        self.open_files.get_or_create(handle.header_sector).close(caller);
        Ok(())
    }

    /// `Read(fd, buf)`: sequential read from the handle's cursor.
    pub fn read(&self, thread: &Arc<Thread>, fd: i32, buf: &mut [u8]) -> Result<usize, FsError> {
        let handle = self.handle_for(thread, fd)?;
        let mut position = handle.position.lock();
        let n = file_header::read_at(self.disk.as_ref(), &self.config, handle.header_sector, buf, *position as usize);
        *position += n as u64;
        Ok(n)
    }

    /// `Write(fd, buf)`: sequential write from the handle's cursor,
    /// growing the header chain as needed under the file's write lock
    /// (`spec.md` §4.4 "Read/write").
    pub fn write(&self, caller: &Arc<dyn PriorityAgent>, thread: &Arc<Thread>, fd: i32, buf: &[u8]) -> Result<usize, FsError> {
        let handle = self.handle_for(thread, fd)?;
        let entry = self.open_files.get_or_create(handle.header_sector);
        entry.write_lock.acquire(caller).expect("write lock");

        let mut position = handle.position.lock();
        let written = {
            let mut free_map = self.free_map.lock();
            let result = file_header::write_with_growth(
                self.disk.as_ref(),
                &self.config,
                &mut free_map,
                handle.header_sector,
                buf,
                *position as usize,
            );
            free_map.write_back(self.disk.as_ref(), &self.config, FREE_MAP_SECTOR);
            result
        };
        if let Ok(n) = written {
            *position += n as u64;
        }
        drop(position);
        entry.write_lock.release(caller).expect("write lock");
        written
    }

    /// `ReadAt(fd, buf, position)`: does not move the handle's cursor.
    pub fn read_at(&self, thread: &Arc<Thread>, fd: i32, buf: &mut [u8], position: usize) -> Result<usize, FsError> {
        let handle = self.handle_for(thread, fd)?;
        Ok(file_header::read_at(self.disk.as_ref(), &self.config, handle.header_sector, buf, position))
    }

    /// `WriteAt(fd, buf, position)`: does not move the handle's cursor,
    /// and unlike `Write` never extends the chain.
    pub fn write_at(
        &self,
        caller: &Arc<dyn PriorityAgent>,
        thread: &Arc<Thread>,
        fd: i32,
        buf: &[u8],
        position: usize,
    ) -> Result<usize, FsError> {
        let handle = self.handle_for(thread, fd)?;
        let entry = self.open_files.get_or_create(handle.header_sector);
        entry.write_lock.acquire(caller).expect("write lock");
        let n = file_header::write_at(self.disk.as_ref(), &self.config, handle.header_sector, buf, position);
        entry.write_lock.release(caller).expect("write lock");
        Ok(n)
    }

    /// Logical byte length of the file open on `fd`.
    pub fn length(&self, thread: &Arc<Thread>, fd: i32) -> Result<usize, FsError> {
        let handle = self.handle_for(thread, fd)?;
        Ok(file_header::chain_length(self.disk.as_ref(), &self.config, handle.header_sector))
    }

    /// `Remove(name)` (`spec.md` §4.4): blocks until every open handle on
    /// `name` has closed before deallocating its chain.
    pub fn remove(&self, caller: &Arc<dyn PriorityAgent>, thread: &Arc<Thread>, name: &str) -> Result<(), FsError> {
        let dir_sector = self.current_dir_sector(thread);
        let mut dir = Directory::fetch_from(self.disk.as_ref(), &self.config, dir_sector);
        let sector = dir.find(name).ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let entry = self.open_files.get_or_create(sector);
        entry.remove_lock.acquire(caller).expect("remove lock");

        if entry.is_removed() {
            entry.remove_lock.release(caller).expect("remove lock");
            return Err(FsError::NotFound(name.to_string()));
        }

        entry.begin_remove(caller, thread.space_id());

        {
            let mut free_map = self.free_map.lock();
            file_header::deallocate_chain(self.disk.as_ref(), &self.config, &mut free_map, sector);
            free_map.clear(sector);
            dir.remove(name);
            free_map.write_back(self.disk.as_ref(), &self.config, FREE_MAP_SECTOR);
            dir.write_back(self.disk.as_ref(), &self.config, &mut free_map, dir_sector);
        }

        entry.finish_remove();
        entry.remove_lock.release(caller).expect("remove lock");
        Ok(())
    }

    /// `ChangeDir(name)`: swaps the caller's current-directory sector
    /// after verifying `name` names a directory.
    pub fn change_dir(&self, thread: &Arc<Thread>, name: &str) -> Result<(), FsError> {
        let dir_sector = self.current_dir_sector(thread);
        let dir = Directory::fetch_from(self.disk.as_ref(), &self.config, dir_sector);
        let target = match dir.find_dir(name) {
            Some(sector) => sector,
            None if dir.find(name).is_some() => return Err(FsError::NotADirectory(name.to_string())),
            None => return Err(FsError::NotFound(name.to_string())),
        };
        self.current_dirs.lock().insert(thread.space_id(), target);
        Ok(())
    }

    /// `LsDir`: every name in the caller's current directory.
    pub fn ls_dir(&self, thread: &Arc<Thread>) -> Vec<String> {
        let dir_sector = self.current_dir_sector(thread);
        Directory::fetch_from(self.disk.as_ref(), &self.config, dir_sector).list()
    }

    /// Number of sectors still unallocated, for diagnostics/tests (S2's
    /// "inspection of the free-sector bitmap").
    pub fn free_sector_count(&self) -> usize {
        self.free_map.lock().count_clear()
    }
}
