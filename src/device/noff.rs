//! `NoffExecutable`: the fixed-layout executable format `spec.md` §6
//! describes, backed by a plain host file. Out-of-scope is the MIPS
//! instruction stream itself -- only the header and the code/data
//! segments `Exec` needs to populate an address space are read here.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use super::Executable;

/// `NOFF` in ASCII, stored as the header's first word.
const MAGIC: u32 = 0x4E4F4646;

/// Eight `u32` fields: magic, then (offset, addr, size) for code and for
/// initialized data, then the uninitialized-data size.
const HEADER_LEN: usize = 32;

struct Header {
    magic: u32,
    code_offset: u32,
    code_addr: u32,
    code_size: u32,
    data_offset: u32,
    data_addr: u32,
    data_size: u32,
    uninit_size: u32,
}

impl Header {
    fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
        let word = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            magic: word(0),
            code_offset: word(1),
            code_addr: word(2),
            code_size: word(3),
            data_offset: word(4),
            data_addr: word(5),
            data_size: word(6),
            uninit_size: word(7),
        }
    }
}

/// An executable read from a host file in the NOFF layout.
pub struct NoffExecutable {
    file: Mutex<File>,
    header: Header,
}

impl NoffExecutable {
    /// Opens `path` and parses its header. Does not check the magic
    /// number eagerly -- that check belongs to `AddressSpace::new`, per
    /// `spec.md` §4.3 step 1, so a bad executable surfaces as
    /// `MemError::BadMagic` rather than an I/O-layer error.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; HEADER_LEN];
        file.read_exact(&mut buf)?;
        Ok(Self {
            file: Mutex::new(file),
            header: Header::parse(&buf),
        })
    }

    fn read_block(&self, buf: &mut [u8], len: usize, offset: usize) {
        let mut file = self.file.lock().expect("noff file mutex poisoned");
        file.seek(SeekFrom::Start(offset as u64))
            .expect("seek within executable file");
        file.read_exact(&mut buf[..len]).expect("read executable segment");
    }
}

impl Executable for NoffExecutable {
    fn check_magic(&self) -> bool {
        self.header.magic == MAGIC
    }

    fn size(&self) -> usize {
        self.header.code_size as usize + self.header.data_size as usize + self.header.uninit_size as usize
    }

    fn code_segment(&self) -> (usize, usize) {
        (self.header.code_offset as usize, self.header.code_size as usize)
    }

    fn code_addr(&self) -> usize {
        self.header.code_addr as usize
    }

    fn data_segment(&self) -> (usize, usize) {
        (self.header.data_offset as usize, self.header.data_size as usize)
    }

    fn data_addr(&self) -> usize {
        self.header.data_addr as usize
    }

    fn uninit_data_size(&self) -> usize {
        self.header.uninit_size as usize
    }

    fn read_code_block(&self, buf: &mut [u8], len: usize, offset: usize) {
        self.read_block(buf, len, offset);
    }

    fn read_data_block(&self, buf: &mut [u8], len: usize, offset: usize) {
        self.read_block(buf, len, offset);
    }
}
