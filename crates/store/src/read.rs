//! Read path: `read`, `get`, `value_size`, `contains`, and the RAM-index
//! lookup shared with the write path.
//!
//! The index stores only `(hash, offset)` pairs, so equal hashes are
//! disambiguated by reading the candidate record and byte-comparing its key
//! against the caller's — a deliberate memory-for-I/O trade.

use blockdev::BlockDevice;
use record::{crc::crc16, crc::CRC_INIT, KeyAccess, RecordError};

use crate::{check_key, Store, StoreError};

/// A record found through the index.
pub(crate) struct Existing {
    pub offset: u32,
    pub data_size: u32,
}

/// Outcome of a lookup: where the key lives, or where it would be inserted.
pub(crate) struct Lookup {
    /// Index-entry position (existing entry, or insertion point on a miss).
    pub idx: usize,
    pub hash: u16,
    pub existing: Option<Existing>,
}

impl<B: BlockDevice> Store<B> {
    /// Locates `key` in the RAM index, reading the medium to resolve hash
    /// collisions. Every probed candidate is fully validated (header checks
    /// and CRC), so a hit proves the record is intact.
    pub(crate) fn find_record(&mut self, key: &[u8]) -> Result<Lookup, StoreError> {
        let hash = crc16(key, CRC_INIT);
        let run = self.index.run(hash);
        for idx in run.clone() {
            let entry = self.index.get(idx);
            match record::read_record(
                &mut self.bd,
                &mut self.buf,
                self.active_area_addr + entry.offset,
                KeyAccess::Validate(key),
                None,
            ) {
                Ok(header) => {
                    return Ok(Lookup {
                        idx,
                        hash,
                        existing: Some(Existing {
                            offset: entry.offset,
                            data_size: header.data_size,
                        }),
                    });
                }
                // same hash, different key: keep scanning the run
                Err(RecordError::KeyMismatch) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Lookup {
            idx: run.end,
            hash,
            existing: None,
        })
    }

    /// Reads the value stored under `key` into `data`, returning the actual
    /// value size.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ItemNotFound`] if the key is absent.
    /// - [`StoreError::BufferTooSmall`] if `data` cannot hold the value; the
    ///   error carries the required size, so the caller can retry (or ask
    ///   [`value_size`](Store::value_size) first).
    /// - [`StoreError::BadParam`] for an invalid key or an empty `data`.
    pub fn read(&mut self, key: &str, data: &mut [u8]) -> Result<u32, StoreError> {
        check_key(key)?;
        if data.is_empty() {
            return Err(StoreError::BadParam);
        }

        let lookup = self.find_record(key.as_bytes())?;
        let existing = lookup.existing.ok_or(StoreError::ItemNotFound)?;
        let header = record::read_record(
            &mut self.bd,
            &mut self.buf,
            self.active_area_addr + existing.offset,
            KeyAccess::Validate(key.as_bytes()),
            Some(data),
        )?;
        Ok(header.data_size)
    }

    /// Allocating convenience over [`read`](Store::read).
    pub fn get(&mut self, key: &str) -> Result<Vec<u8>, StoreError> {
        let size = self.value_size(key)? as usize;
        let mut out = Vec::new();
        out.try_reserve_exact(size).map_err(|_| StoreError::MemAlloc)?;
        out.resize(size, 0);
        if size > 0 {
            self.read(key, &mut out)?;
        }
        Ok(out)
    }

    /// Size of the value stored under `key`, without copying it out.
    pub fn value_size(&mut self, key: &str) -> Result<u32, StoreError> {
        check_key(key)?;
        let lookup = self.find_record(key.as_bytes())?;
        lookup
            .existing
            .map(|e| e.data_size)
            .ok_or(StoreError::ItemNotFound)
    }

    /// Existence probe.
    pub fn contains(&mut self, key: &str) -> Result<bool, StoreError> {
        check_key(key)?;
        Ok(self.find_record(key.as_bytes())?.existing.is_some())
    }
}
