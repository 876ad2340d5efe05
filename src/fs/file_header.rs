//! On-disk file header and header-chain operations (`spec.md` §3 "File
//! header (on-disk, one per sector)", §4.4 "File header chain"), grounded
//! in `examples/original_source/filesys/raw_file_header.hh` and
//! `open_file.cc`'s `ReadAt`/`WriteAt`/`Write`.
//!
//! Unlike the original's `OpenFile`, which caches a mutable "current
//! header" across calls, every operation here re-fetches whatever header
//! sectors it needs from `disk`. That keeps a header chain's on-disk state
//! as the single source of truth and lets concurrent `ReadAt` calls (which
//! the per-file write lock does not serialize against, per `spec.md`
//! §4.4) observe a consistent snapshot rather than another thread's
//! in-progress mutation of cached state.

use crate::config::KernelConfig;
use crate::device::Disk;

use super::free_map::FreeSectorBitmap;
use super::FsError;

/// A single on-disk file header: one sector's worth of `(numBytes,
/// dataSectors[NUM_DIRECT], nextFileHeader)`. `numSectors` is not a
/// distinct on-disk field; it is always `ceil(numBytes / sectorSize)`.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub num_bytes: u32,
    pub data_sectors: Vec<u32>,
    pub next: u32,
}

impl FileHeader {
    /// A freshly allocated, empty header (no data, no continuation).
    pub fn empty() -> Self {
        Self {
            num_bytes: 0,
            data_sectors: Vec::new(),
            next: 0,
        }
    }

    /// Reads and parses the header stored at `sector`.
    pub fn fetch_from(disk: &dyn Disk, sector: u32, num_direct: usize) -> Self {
        let mut buf = vec![0u8; disk.sector_size()];
        disk.read_sector(sector as usize, &mut buf);
        Self::from_bytes(&buf, num_direct)
    }

    /// Persists this header to `sector`.
    pub fn write_back(&self, disk: &dyn Disk, sector: u32, num_direct: usize) {
        let mut buf = vec![0u8; disk.sector_size()];
        self.to_bytes(&mut buf, num_direct);
        disk.write_sector(sector as usize, &buf);
    }

    fn from_bytes(buf: &[u8], num_direct: usize) -> Self {
        let num_bytes = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        // numSectors is not stored: a header's occupied direct slots are
        // exactly ceil(numBytes / sectorSize), so persisting it would only
        // be a redundant copy of data derivable from numBytes and the
        // sector size (buf.len()).
        let num_sectors = (num_bytes as usize).div_ceil(buf.len());
        let mut data_sectors = Vec::with_capacity(num_sectors);
        for i in 0..num_direct {
            let value = u32::from_le_bytes(
                buf[4 + i * 4..4 + i * 4 + 4].try_into().unwrap(),
            );
            if i < num_sectors {
                data_sectors.push(value);
            }
        }
        let next_offset = 4 + num_direct * 4;
        let next = u32::from_le_bytes(buf[next_offset..next_offset + 4].try_into().unwrap());
        Self {
            num_bytes,
            data_sectors,
            next,
        }
    }

    fn to_bytes(&self, buf: &mut [u8], num_direct: usize) {
        buf[0..4].copy_from_slice(&self.num_bytes.to_le_bytes());
        for i in 0..num_direct {
            let value = self.data_sectors.get(i).copied().unwrap_or(0);
            buf[4 + i * 4..4 + i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        let next_offset = 4 + num_direct * 4;
        buf[next_offset..next_offset + 4].copy_from_slice(&self.next.to_le_bytes());
    }

    /// Remaining direct-slot capacity, in bytes, this header can still
    /// grow into before it is full (`spec.md` §4.4 "`Allocate(bytes)`
    /// extends the current header ... until the header is full").
    fn remaining_capacity(&self, config: &KernelConfig) -> usize {
        config.header_capacity_bytes() - self.data_sectors.len() * config.sector_size
    }

    /// Grows this header's own byte count by `extra_bytes`, claiming
    /// additional data sectors from `free_map` as needed. Returns `false`
    /// (no mutation) if `extra_bytes` exceeds the header's remaining
    /// direct-slot capacity or the free map runs out of sectors mid-grow
    /// (any sectors claimed before the failure are released back to
    /// `free_map`, per `spec.md` §4.4's consistency requirement).
    fn grow(&mut self, free_map: &mut FreeSectorBitmap, extra_bytes: usize, config: &KernelConfig) -> bool {
        if extra_bytes > self.remaining_capacity(config) {
            return false;
        }
        let extra_sectors = extra_bytes.div_ceil(config.sector_size);
        let mut claimed = Vec::with_capacity(extra_sectors);
        for _ in 0..extra_sectors {
            match free_map.find() {
                Some(sector) => claimed.push(sector),
                None => {
                    for s in claimed {
                        free_map.clear(s);
                    }
                    return false;
                }
            }
        }
        self.data_sectors.extend(claimed);
        self.num_bytes += extra_bytes as u32;
        true
    }
}

/// `ByteToSector(offset)`: walks the chain rooted at `root_sector`,
/// locating the disk sector holding the byte at `offset` within the
/// logical file.
pub fn byte_to_sector(disk: &dyn Disk, config: &KernelConfig, root_sector: u32, offset: usize) -> u32 {
    let mut sector = root_sector;
    let mut remaining = offset;
    loop {
        let header = FileHeader::fetch_from(disk, sector, config.num_direct());
        if remaining < header.num_bytes as usize {
            return header.data_sectors[remaining / config.sector_size];
        }
        remaining -= header.num_bytes as usize;
        sector = header.next;
    }
}

/// A file's byte length is the sum of `numBytes` across its header chain
/// (`spec.md` §4.4).
pub fn chain_length(disk: &dyn Disk, config: &KernelConfig, root_sector: u32) -> usize {
    let mut total = 0usize;
    let mut sector = root_sector;
    loop {
        let header = FileHeader::fetch_from(disk, sector, config.num_direct());
        total += header.num_bytes as usize;
        if header.next == 0 {
            break;
        }
        sector = header.next;
    }
    total
}

/// `ReadAt`: reads up to `buf.len()` bytes starting at `position`,
/// trimmed to the file's current length. Returns the number of bytes
/// actually read.
pub fn read_at(disk: &dyn Disk, config: &KernelConfig, root_sector: u32, buf: &mut [u8], position: usize) -> usize {
    let file_length = chain_length(disk, config, root_sector);
    if position >= file_length {
        return 0;
    }
    let num_bytes = buf.len().min(file_length - position);
    if num_bytes == 0 {
        return 0;
    }

    let sector_size = config.sector_size;
    let first_sector = position / sector_size;
    let last_sector = (position + num_bytes - 1) / sector_size;
    let mut scratch = vec![0u8; (last_sector - first_sector + 1) * sector_size];
    for (i, sector_index) in (first_sector..=last_sector).enumerate() {
        let disk_sector = byte_to_sector(disk, config, root_sector, sector_index * sector_size);
        disk.read_sector(
            disk_sector as usize,
            &mut scratch[i * sector_size..(i + 1) * sector_size],
        );
    }
    let start = position - first_sector * sector_size;
    buf[..num_bytes].copy_from_slice(&scratch[start..start + num_bytes]);
    num_bytes
}

/// `WriteAt`: overwrites up to `buf.len()` bytes starting at `position`,
/// trimmed to the file's *current* length -- unlike `write_with_growth`,
/// this never extends the chain (`spec.md` §4.4: "`ReadAt`/`WriteAt`
/// operate on absolute offsets ... partial sectors are read-modify-
/// written"). Returns the number of bytes actually written.
pub fn write_at(disk: &dyn Disk, config: &KernelConfig, root_sector: u32, buf: &[u8], position: usize) -> usize {
    let file_length = chain_length(disk, config, root_sector);
    if position >= file_length {
        return 0;
    }
    let num_bytes = buf.len().min(file_length - position);
    if num_bytes == 0 {
        return 0;
    }

    let sector_size = config.sector_size;
    let first_sector = position / sector_size;
    let last_sector = (position + num_bytes - 1) / sector_size;
    let mut scratch = vec![0u8; (last_sector - first_sector + 1) * sector_size];

    let first_aligned = position == first_sector * sector_size;
    let last_aligned = position + num_bytes == (last_sector + 1) * sector_size;

    if !first_aligned {
        read_at(disk, config, root_sector, &mut scratch[..sector_size], first_sector * sector_size);
    }
    if !last_aligned && (first_sector != last_sector || first_aligned) {
        let tail_start = (last_sector - first_sector) * sector_size;
        read_at(
            disk,
            config,
            root_sector,
            &mut scratch[tail_start..tail_start + sector_size],
            last_sector * sector_size,
        );
    }

    let copy_start = position - first_sector * sector_size;
    scratch[copy_start..copy_start + num_bytes].copy_from_slice(&buf[..num_bytes]);

    for (i, sector_index) in (first_sector..=last_sector).enumerate() {
        let disk_sector = byte_to_sector(disk, config, root_sector, sector_index * sector_size);
        disk.write_sector(disk_sector as usize, &scratch[i * sector_size..(i + 1) * sector_size]);
    }
    num_bytes
}

/// `Allocate(bytes)`/`Write`'s growth path (`spec.md` §4.4): extends the
/// chain rooted at `root_sector` so its logical length covers
/// `target_length` bytes, then writes `buf` at `position` (which must lie
/// in `[old_length, target_length)`).
///
/// Growth order, matching `spec.md`: (a) fill the remaining direct-slot
/// capacity of the last existing header; (b) if more room is needed,
/// allocate a fresh chain of new header sectors -- `ceil(remaining /
/// header_capacity_bytes)` of them -- threaded via `next`. On a mid-stream
/// allocation failure the bytes successfully reserved are kept linked and
/// written; sectors reserved for a header that never got linked in are
/// released. Returns the number of bytes of `buf` actually written.
pub fn write_with_growth(
    disk: &dyn Disk,
    config: &KernelConfig,
    free_map: &mut FreeSectorBitmap,
    root_sector: u32,
    buf: &[u8],
    position: usize,
) -> Result<usize, FsError> {
    let old_length = chain_length(disk, config, root_sector);
    let target_length = position + buf.len();

    if target_length > old_length {
        let reserved = extend_chain(disk, config, free_map, root_sector, target_length - old_length);
        let new_length = old_length + reserved;
        let writable = new_length.saturating_sub(position).min(buf.len());
        if writable == 0 {
            return Ok(0);
        }
        let written = write_at(disk, config, root_sector, &buf[..writable], position);
        return Ok(written);
    }

    Ok(write_at(disk, config, root_sector, buf, position))
}

/// Extends the chain rooted at `root_sector` by up to `extra_bytes` of
/// logical capacity, growing the last existing header first and then
/// appending new header sectors. Returns how many of the requested extra
/// bytes were actually reserved (less than `extra_bytes` only if the free
/// map ran out of sectors).
fn extend_chain(
    disk: &dyn Disk,
    config: &KernelConfig,
    free_map: &mut FreeSectorBitmap,
    root_sector: u32,
    extra_bytes: usize,
) -> usize {
    let num_direct = config.num_direct();
    let mut remaining = extra_bytes;
    let mut reserved = 0usize;

    // Walk to the last header in the existing chain, growing any header
    // that still has direct-slot room along the way.
    let mut sector = root_sector;
    loop {
        let mut header = FileHeader::fetch_from(disk, sector, num_direct);
        if remaining > 0 && header.next == 0 {
            let room = header.remaining_capacity(config).min(remaining);
            if room > 0 && header.grow(free_map, room, config) {
                header.write_back(disk, sector, num_direct);
                remaining -= room;
                reserved += room;
            }
            break;
        }
        if header.next == 0 {
            break;
        }
        sector = header.next;
    }

    // Append new, fully-owned header sectors until either `remaining`
    // is satisfied or the free map is exhausted.
    let mut tail_sector = sector;
    while remaining > 0 {
        let Some(new_sector) = free_map.find() else {
            break;
        };
        let bytes_here = remaining.min(config.header_capacity_bytes());
        let mut new_header = FileHeader::empty();
        if !new_header.grow(free_map, bytes_here, config) {
            free_map.clear(new_sector);
            break;
        }
        new_header.write_back(disk, new_sector, num_direct);

        let mut tail_header = FileHeader::fetch_from(disk, tail_sector, num_direct);
        tail_header.next = new_sector;
        tail_header.write_back(disk, tail_sector, num_direct);

        tail_sector = new_sector;
        remaining -= bytes_here;
        reserved += bytes_here;
    }

    reserved
}

/// `Deallocate`: releases every data sector and header sector in the
/// chain rooted at `root_sector` back to `free_map`. Does *not* clear
/// `root_sector` itself -- callers that own the root (e.g. `Remove`)
/// clear it explicitly once they're done reading the first header.
pub fn deallocate_chain(disk: &dyn Disk, config: &KernelConfig, free_map: &mut FreeSectorBitmap, root_sector: u32) {
    let num_direct = config.num_direct();
    let mut sector = root_sector;
    loop {
        let header = FileHeader::fetch_from(disk, sector, num_direct);
        for &data_sector in &header.data_sectors {
            free_map.clear(data_sector);
        }
        let next = header.next;
        if sector != root_sector {
            free_map.clear(sector);
        }
        if next == 0 {
            break;
        }
        sector = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDisk;

    fn test_config() -> KernelConfig {
        KernelConfig {
            sector_size: 128,
            num_sectors: 64,
            ..KernelConfig::default()
        }
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let config = test_config();
        let disk = MemDisk::new(config.sector_size, config.num_sectors);
        let header = FileHeader {
            num_bytes: 10,
            data_sectors: vec![5, 6],
            next: 0,
        };
        header.write_back(&disk, 3, config.num_direct());
        let reread = FileHeader::fetch_from(&disk, 3, config.num_direct());
        assert_eq!(reread.num_bytes, 10);
        assert_eq!(reread.data_sectors, vec![5, 6]);
        assert_eq!(reread.next, 0);
    }

    #[test]
    fn write_with_growth_extends_within_a_single_header() {
        let config = test_config();
        let disk = MemDisk::new(config.sector_size, config.num_sectors);
        let mut free_map = FreeSectorBitmap::new(config.num_sectors);
        free_map.mark(0); // pretend sector 0 is the header itself

        FileHeader::empty().write_back(&disk, 0, config.num_direct());

        let data = b"hello world";
        let written = write_with_growth(&disk, &config, &mut free_map, 0, data, 0).unwrap();
        assert_eq!(written, data.len());
        assert_eq!(chain_length(&disk, &config, 0), data.len());

        let mut readback = vec![0u8; data.len()];
        let read = read_at(&disk, &config, 0, &mut readback, 0);
        assert_eq!(read, data.len());
        assert_eq!(&readback, data);
    }
}
