//! # Record — on-medium record codec
//!
//! Every unit the store persists — key-value pairs, delete tombstones and the
//! area-header record — is one self-describing *record*, serialized through
//! this crate.
//!
//! ## Binary Record Format
//!
//! ```text
//! [magic: u32 LE][format_version: u8][flags: u8][header_size: u16 LE]
//! [key_size: u16 LE][data_size: u32 LE][crc: u32 LE]
//! [key bytes ...][value bytes ...][pad up to program size]
//! ```
//!
//! - `magic` is `0xFACEFACE`; all-zero or all-ones magic marks erased space.
//! - `flags` bit 7 marks a delete tombstone (`data_size == 0`).
//! - `crc` carries a CRC-16/CCITT-FALSE over the first 14 header bytes, the
//!   key and the value, in its low 16 bits. The pad is outside the CRC.
//! - A record occupies `align_up(18 + key_size + data_size, program_size)`
//!   bytes so the next record starts on a program-page boundary.
//!
//! Writes go through [`BufferedWriter`], which gathers header, key and value
//! into a program-size-aligned transaction buffer and programs full buffers
//! as they fill; the final partial page is zero-padded. Reads classify the
//! record start ([`RecordError::Erased`] recognizes free space), optionally
//! validate or capture the key, copy the value out, and verify the CRC by
//! streaming the medium back through the same buffer.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use blockdev::{BdError, BlockDevice};

pub mod crc;

use crc::{crc16, CRC_INIT};

/// Identifies a valid record header.
pub const RECORD_MAGIC: u32 = 0xFACE_FACE;
/// Version of the record format written by this crate.
pub const FORMAT_VERSION: u8 = 0;
/// `flags` bit marking a delete tombstone.
pub const DELETE_FLAG: u8 = 1 << 7;
/// Keys must be shorter than this (in bytes).
pub const MAX_KEY_SIZE: usize = 64;
/// Serialized header length.
pub const HEADER_LEN: usize = 18;
/// Offset of the `crc` field; the header CRC covers everything before it.
const CRC_OFFSET: usize = 14;

/// Errors from reading or writing a single record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The record start holds erased bytes; this is how free space is
    /// recognized and it never escapes the store's public API.
    #[error("erased data at record start")]
    Erased,

    /// Bad magic, impossible header fields, or a CRC mismatch.
    #[error("record is corrupt")]
    Invalid,

    /// The key on the medium differs from the caller's key (hash collision).
    #[error("record key does not match")]
    KeyMismatch,

    /// The caller's value buffer cannot hold the stored value.
    #[error("destination buffer too small, {required} bytes required")]
    BufferTooSmall { required: u32 },

    /// Pass-through block-device error.
    #[error(transparent)]
    Device(#[from] BdError),
}

/// Parsed record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: u32,
    pub format_version: u8,
    pub flags: u8,
    pub header_size: u16,
    pub key_size: u16,
    pub data_size: u32,
    pub crc: u32,
}

impl RecordHeader {
    /// Builds the header for a record about to be written, including its CRC
    /// over (header-without-crc ‖ key ‖ data).
    pub fn new(key: &[u8], data: &[u8], flags: u8) -> Self {
        debug_assert!(!key.is_empty() && key.len() < MAX_KEY_SIZE);
        let mut header = Self {
            magic: RECORD_MAGIC,
            format_version: FORMAT_VERSION,
            flags,
            header_size: HEADER_LEN as u16,
            key_size: key.len() as u16,
            data_size: data.len() as u32,
            crc: 0,
        };
        let mut crc = crc16(&header.encode()[..CRC_OFFSET], CRC_INIT);
        crc = crc16(key, crc);
        crc = crc16(data, crc);
        header.crc = crc as u32;
        header
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        buf[4] = self.format_version;
        buf[5] = self.flags;
        LittleEndian::write_u16(&mut buf[6..8], self.header_size);
        LittleEndian::write_u16(&mut buf[8..10], self.key_size);
        LittleEndian::write_u32(&mut buf[10..14], self.data_size);
        LittleEndian::write_u32(&mut buf[14..18], self.crc);
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            magic: LittleEndian::read_u32(&buf[0..4]),
            format_version: buf[4],
            flags: buf[5],
            header_size: LittleEndian::read_u16(&buf[6..8]),
            key_size: LittleEndian::read_u16(&buf[8..10]),
            data_size: LittleEndian::read_u32(&buf[10..14]),
            crc: LittleEndian::read_u32(&buf[14..18]),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags & DELETE_FLAG != 0
    }

    /// Total on-medium size of this record at a given program granularity.
    pub fn record_size(&self, program_size: u32) -> u32 {
        record_size(self.key_size as u32, self.data_size, program_size)
    }
}

/// `align_up(18 + key_size + data_size, program_size)`.
pub fn record_size(key_size: u32, data_size: u32, program_size: u32) -> u32 {
    let raw = HEADER_LEN as u64 + key_size as u64 + data_size as u64;
    (raw.div_ceil(program_size as u64) * program_size as u64) as u32
}

/// Gathers arbitrary-sized appends into program-size-aligned bursts.
///
/// `push` copies source bytes into the transaction buffer and programs the
/// buffer each time it fills; `finish` zero-pads the final partial fill up to
/// the program page and programs it. The buffer length must be a multiple of
/// the program size and the start address program-aligned — both are
/// established once when the store sizes its transaction buffer.
pub struct BufferedWriter<'a, B: BlockDevice> {
    bd: &'a mut B,
    buf: &'a mut [u8],
    fill: usize,
    addr: u32,
}

impl<'a, B: BlockDevice> BufferedWriter<'a, B> {
    pub fn new(bd: &'a mut B, buf: &'a mut [u8], addr: u32) -> Self {
        debug_assert!(!buf.is_empty());
        debug_assert_eq!(buf.len() % bd.program_size(addr) as usize, 0);
        debug_assert_eq!(addr % bd.program_size(addr), 0);
        Self {
            bd,
            buf,
            fill: 0,
            addr,
        }
    }

    /// Appends `data`, programming the buffer each time it fills.
    pub fn push(&mut self, mut data: &[u8]) -> Result<(), BdError> {
        while !data.is_empty() {
            let room = self.buf.len() - self.fill;
            let n = room.min(data.len());
            self.buf[self.fill..self.fill + n].copy_from_slice(&data[..n]);
            self.fill += n;
            data = &data[n..];
            if self.fill == self.buf.len() {
                self.bd.program(self.addr, self.buf)?;
                self.addr += self.buf.len() as u32;
                self.fill = 0;
            }
        }
        Ok(())
    }

    /// Flushes the remaining partial fill, zero-padded to the program page.
    pub fn finish(mut self) -> Result<(), BdError> {
        if self.fill == 0 {
            return Ok(());
        }
        let program_size = self.bd.program_size(self.addr) as usize;
        let padded = self.fill.div_ceil(program_size) * program_size;
        self.buf[self.fill..padded].fill(0);
        self.bd.program(self.addr, &self.buf[..padded])
    }
}

/// Serializes one record (header ‖ key ‖ value ‖ pad) at `record_addr`.
///
/// `scratch` is the store's transaction buffer. Returns the header that was
/// written so the caller can derive the record size.
pub fn write_record<B: BlockDevice>(
    bd: &mut B,
    scratch: &mut [u8],
    record_addr: u32,
    key: &[u8],
    data: &[u8],
    flags: u8,
) -> Result<RecordHeader, RecordError> {
    debug_assert!(scratch.len() >= HEADER_LEN);

    let header = RecordHeader::new(key, data, flags);
    let encoded = header.encode();

    let mut writer = BufferedWriter::new(bd, scratch, record_addr);
    writer.push(&encoded)?;
    writer.push(key)?;
    writer.push(data)?;
    writer.finish()?;

    Ok(header)
}

/// How [`read_record`] should treat the key bytes on the medium.
pub enum KeyAccess<'a> {
    /// Byte-compare against the caller's key; a mismatch is
    /// [`RecordError::KeyMismatch`]. Used for lookups, where equal hashes are
    /// disambiguated by the key bytes themselves.
    Validate(&'a [u8]),
    /// Copy the key bytes into the provided staging buffer (replay).
    Capture(&'a mut [u8]),
}

/// Reads and validates one record starting at `record_addr`.
///
/// Classification happens in order: erased magic, bad magic, impossible
/// header fields, short destination buffer, key mismatch, CRC mismatch. With
/// `data == None` the value bytes are still streamed through `scratch` so the
/// CRC covers the whole record.
pub fn read_record<B: BlockDevice>(
    bd: &mut B,
    scratch: &mut [u8],
    record_addr: u32,
    key: KeyAccess<'_>,
    data: Option<&mut [u8]>,
) -> Result<RecordHeader, RecordError> {
    let mut raw = [0u8; HEADER_LEN];
    bd.read(record_addr, &mut raw)?;
    let header = RecordHeader::decode(&raw);

    if header.magic == 0x0000_0000 || header.magic == 0xFFFF_FFFF {
        return Err(RecordError::Erased);
    }
    if header.magic != RECORD_MAGIC {
        return Err(RecordError::Invalid);
    }
    if header.key_size == 0 || header.key_size as usize >= MAX_KEY_SIZE {
        return Err(RecordError::Invalid);
    }
    if (header.header_size as usize) < HEADER_LEN {
        return Err(RecordError::Invalid);
    }
    if let Some(buf) = data.as_deref() {
        if buf.len() < header.data_size as usize {
            return Err(RecordError::BufferTooSmall {
                required: header.data_size,
            });
        }
    }

    let mut crc = crc16(&raw[..CRC_OFFSET], CRC_INIT);

    // header_size, not HEADER_LEN: readers honor the stored offset so a
    // future format can grow the header without breaking old readers.
    let key_addr = record_addr + header.header_size as u32;
    let key_size = header.key_size as usize;
    match key {
        KeyAccess::Validate(user_key) => {
            validate_key(bd, scratch, key_addr, user_key, key_size)?;
            // the medium's key bytes equal the caller's at this point
            crc = crc16(user_key, crc);
        }
        KeyAccess::Capture(buf) => {
            debug_assert!(buf.len() >= key_size);
            bd.read(key_addr, &mut buf[..key_size])?;
            crc = crc16(&buf[..key_size], crc);
        }
    }

    let data_addr = key_addr + header.key_size as u32;
    match data {
        Some(buf) => {
            let out = &mut buf[..header.data_size as usize];
            bd.read(data_addr, out)?;
            crc = crc16(out, crc);
        }
        None => {
            crc = streaming_crc(bd, scratch, data_addr, header.data_size, crc)?;
        }
    }

    if header.crc != crc as u32 {
        return Err(RecordError::Invalid);
    }
    Ok(header)
}

/// Compares the key bytes on the medium against `user_key`, one
/// transaction-buffer chunk at a time.
fn validate_key<B: BlockDevice>(
    bd: &mut B,
    scratch: &mut [u8],
    mut addr: u32,
    user_key: &[u8],
    key_size: usize,
) -> Result<(), RecordError> {
    if user_key.len() != key_size {
        return Err(RecordError::KeyMismatch);
    }
    let mut compared = 0;
    while compared < key_size {
        let n = (key_size - compared).min(scratch.len());
        let chunk = &mut scratch[..n];
        bd.read(addr, chunk)?;
        if chunk[..] != user_key[compared..compared + n] {
            return Err(RecordError::KeyMismatch);
        }
        addr += n as u32;
        compared += n;
    }
    Ok(())
}

/// Extends `crc` over `len` medium bytes starting at `addr`, chunked through
/// `scratch`.
fn streaming_crc<B: BlockDevice>(
    bd: &mut B,
    scratch: &mut [u8],
    mut addr: u32,
    len: u32,
    mut crc: u16,
) -> Result<u16, RecordError> {
    let mut remaining = len as usize;
    while remaining > 0 {
        let n = remaining.min(scratch.len());
        let chunk = &mut scratch[..n];
        bd.read(addr, chunk)?;
        crc = crc16(chunk, crc);
        addr += n as u32;
        remaining -= n;
    }
    Ok(crc)
}

#[cfg(test)]
mod tests;
