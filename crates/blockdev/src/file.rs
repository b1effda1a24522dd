use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{check_aligned, check_bounds, BdError, BlockDevice};

/// Erased byte value of the image file (NOR convention).
const ERASED: u8 = 0xFF;

/// File-backed block device.
///
/// Backs the store with an image file so the CLI survives restarts. The file
/// is created (or extended) to the requested length and filled with the
/// erased value. Program and erase are followed by `sync_data` so that a
/// completed call is durable — the store's commit-point reasoning assumes a
/// program call that returned success actually reached the medium.
pub struct FileBlockDevice {
    file: File,
    len: u32,
    read_size: u32,
    program_size: u32,
    erase_size: u32,
}

impl FileBlockDevice {
    /// Opens (or creates) an image file of `len` bytes.
    ///
    /// An existing shorter file is extended with erased bytes; existing
    /// content is preserved so a store re-opened over the same image finds
    /// its records.
    pub fn open<P: AsRef<Path>>(
        path: P,
        len: u32,
        read_size: u32,
        program_size: u32,
        erase_size: u32,
    ) -> Result<Self, BdError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let current = file.metadata()?.len();
        if current < len as u64 {
            file.seek(SeekFrom::End(0))?;
            let mut remaining = len as u64 - current;
            let chunk = [ERASED; 4096];
            while remaining > 0 {
                let n = remaining.min(chunk.len() as u64) as usize;
                file.write_all(&chunk[..n])?;
                remaining -= n as u64;
            }
            file.sync_data()?;
        }

        Ok(Self {
            file,
            len,
            read_size,
            program_size,
            erase_size,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BdError> {
        check_bounds(addr, buf.len(), self.len)?;
        self.file.seek(SeekFrom::Start(addr as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), BdError> {
        check_aligned(addr, data.len() as u32, self.program_size)?;
        check_bounds(addr, data.len(), self.len)?;
        self.file.seek(SeekFrom::Start(addr as u64))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: u32) -> Result<(), BdError> {
        check_aligned(addr, len, self.erase_size)?;
        check_bounds(addr, len as usize, self.len)?;
        self.file.seek(SeekFrom::Start(addr as u64))?;
        let chunk = [ERASED; 4096];
        let mut remaining = len as usize;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            self.file.write_all(&chunk[..n])?;
            remaining -= n;
        }
        self.file.sync_data()?;
        Ok(())
    }

    fn read_size(&self, _addr: u32) -> u32 {
        self.read_size
    }

    fn program_size(&self, _addr: u32) -> u32 {
        self.program_size
    }

    fn erase_size(&self, _addr: u32) -> u32 {
        self.erase_size
    }
}
