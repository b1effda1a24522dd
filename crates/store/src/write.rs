//! Write path: `write`, `delete`, `reset`, and the shared mutation pipeline.
//!
//! All mutations flow through [`Store::mutate`]: locate the key, classify the
//! operation, check capacity (logically against live data, physically
//! against the append cursor), garbage-collect when the append would
//! overflow, then append and update the RAM index and counters. A mutation
//! becomes visible only once its record is fully programmed; a torn append
//! is dropped by replay at the next startup.

use blockdev::BlockDevice;
use ramindex::Entry;

use crate::gc::Fold;
use crate::{check_key, Store, StoreError};

impl<B: BlockDevice> Store<B> {
    /// Stores `data` under `key`, replacing any previous value.
    ///
    /// Zero-length values are valid. Returns [`StoreError::StorageFull`]
    /// when the live data set would no longer fit one area, and
    /// [`StoreError::MemAlloc`] when the index cannot grow.
    pub fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        check_key(key)?;
        if u32::try_from(data.len()).is_err() {
            return Err(StoreError::BadParam);
        }
        self.mutate(key.as_bytes(), data, false)
    }

    /// Deletes `key`. Deleting an absent key succeeds.
    pub fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.mutate(key.as_bytes(), &[], true)
    }

    fn mutate(&mut self, key: &[u8], data: &[u8], delete: bool) -> Result<(), StoreError> {
        let lookup = self.find_record(key)?;
        let found = lookup.existing.is_some();

        // deleting something already gone is a successful no-op
        if delete && !found {
            return Ok(());
        }

        // grow the index before anything reaches the medium, so an
        // allocation failure leaves the store untouched
        if !delete && !found {
            self.index.reserve_for_insert()?;
        }

        let area_size = self.area_size();
        // a payload that cannot fit even an empty area is full, not BadParam;
        // checking in u64 keeps the u32 size math below from wrapping
        if record::HEADER_LEN as u64 + key.len() as u64 + data.len() as u64 > area_size as u64 {
            return Err(StoreError::StorageFull);
        }

        let program_size = self.bd.program_size(self.active_area_addr);
        let new_size = record::record_size(key.len() as u32, data.len() as u32, program_size);
        let old_size = lookup
            .existing
            .as_ref()
            .map(|e| record::record_size(key.len() as u32, e.data_size, program_size))
            .unwrap_or(0);

        // logical capacity: would the live set exceed one area after this?
        if !delete && self.consumed_size - old_size + new_size > area_size {
            return Err(StoreError::StorageFull);
        }

        // physical capacity: does the append fit the active area's tail?
        if self.free_space_offset + new_size > area_size {
            let fold = if delete {
                Fold::Delete {
                    idx: lookup.idx,
                    old_size,
                }
            } else if found {
                Fold::Update {
                    idx: lookup.idx,
                    hash: lookup.hash,
                    key,
                    data,
                    old_size,
                    new_size,
                }
            } else {
                Fold::None
            };
            self.collect_garbage(fold)?;
            if found {
                // the update or delete was folded into the compaction
                return Ok(());
            }
        }

        debug_assert!(self.free_space_offset + new_size <= area_size);

        let flags = if delete { record::DELETE_FLAG } else { 0 };
        let record_addr = self.active_area_addr + self.free_space_offset;
        record::write_record(&mut self.bd, &mut self.buf, record_addr, key, data, flags)?;

        let entry = Entry {
            hash: lookup.hash,
            offset: self.free_space_offset,
        };
        if delete {
            self.index.remove(lookup.idx);
            self.consumed_size -= old_size;
        } else if found {
            self.index.update(lookup.idx, entry);
            self.consumed_size = self.consumed_size - old_size + new_size;
        } else {
            self.index.insert(lookup.idx, entry)?;
            self.consumed_size += new_size;
        }
        self.free_space_offset += new_size;
        Ok(())
    }

    /// Erases all logical content. The next write begins in a freshly
    /// compacted area under the next area version.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.index.clear();
        self.collect_garbage(Fold::None)?;
        self.consumed_size = self.free_space_offset;
        Ok(())
    }
}
