//! In-memory `Disk` implementation used by the demo binary and the test
//! suite in place of the out-of-scope raw disk device model.

use std::sync::Mutex;

use super::Disk;

/// A disk backed by a flat in-process byte buffer.
pub struct MemDisk {
    sector_size: usize,
    sectors: Mutex<Vec<u8>>,
    num_sectors: usize,
}

impl MemDisk {
    /// Creates a zeroed disk of `num_sectors` sectors, each `sector_size`
    /// bytes.
    pub fn new(sector_size: usize, num_sectors: usize) -> Self {
        Self {
            sector_size,
            sectors: Mutex::new(vec![0u8; sector_size * num_sectors]),
            num_sectors,
        }
    }
}

impl Disk for MemDisk {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn num_sectors(&self) -> usize {
        self.num_sectors
    }

    fn read_sector(&self, n: usize, buf: &mut [u8]) {
        assert!(n < self.num_sectors, "sector {n} out of range");
        let sectors = self.sectors.lock().unwrap();
        let start = n * self.sector_size;
        buf[..self.sector_size].copy_from_slice(&sectors[start..start + self.sector_size]);
    }

    fn write_sector(&self, n: usize, buf: &[u8]) {
        assert!(n < self.num_sectors, "sector {n} out of range");
        let mut sectors = self.sectors.lock().unwrap();
        let start = n * self.sector_size;
        sectors[start..start + self.sector_size].copy_from_slice(&buf[..self.sector_size]);
    }
}
