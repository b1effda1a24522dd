//! Garbage collection: compacts live records into the swap area and commits
//! by writing the swap area's header.
//!
//! The protocol tolerates interruption at any step. Everything before the
//! header write mutates only the swap area, which the old header ordering
//! makes non-authoritative; after the header write both halves are valid and
//! startup picks the new one by version. The old active area is left
//! unerased until it becomes the swap target of the next collection.

use blockdev::BlockDevice;
use ramindex::Entry;

use crate::{Store, StoreError};

/// An in-flight mutation folded into the compaction.
///
/// When an update or delete triggers GC there may be no room to append its
/// record first, so the collector applies it structurally: an update skips
/// the key's old record and writes the new one at the tail; a delete skips
/// the old record and drops the index entry, with no tombstone needed — the
/// compacted area only contains live records.
pub(crate) enum Fold<'a> {
    /// Pure compaction.
    None,
    /// Drop the record behind index entry `idx`.
    Delete { idx: usize, old_size: u32 },
    /// Replace the record behind index entry `idx` with `key` → `data`.
    Update {
        idx: usize,
        hash: u16,
        key: &'a [u8],
        data: &'a [u8],
        old_size: u32,
        new_size: u32,
    },
}

impl<B: BlockDevice> Store<B> {
    pub(crate) fn collect_garbage(&mut self, fold: Fold<'_>) -> Result<(), StoreError> {
        // a folded update must fit the compacted projection; refuse before
        // touching the medium
        if let Fold::Update {
            old_size, new_size, ..
        } = &fold
        {
            if self.consumed_size - *old_size + *new_size > self.area_size() {
                return Err(StoreError::StorageFull);
            }
        }

        self.erase_area(self.gc_area_addr)?;

        let skip = match &fold {
            Fold::None => None,
            Fold::Delete { idx, .. } | Fold::Update { idx, .. } => Some(*idx),
        };

        // copy live records in index order, rewriting offsets as they land
        let mut dst_offset = self.area_header_record_size(self.gc_area_addr);
        for idx in 0..self.index.len() {
            if Some(idx) == skip {
                continue;
            }
            let src_offset = self.index.get(idx).offset;
            let next = self.copy_record(src_offset, dst_offset)?;
            self.index.set_offset(idx, dst_offset);
            dst_offset = next;
        }

        match fold {
            Fold::Update {
                idx,
                hash,
                key,
                data,
                old_size,
                new_size,
            } => {
                record::write_record(
                    &mut self.bd,
                    &mut self.buf,
                    self.gc_area_addr + dst_offset,
                    key,
                    data,
                    0,
                )?;
                self.index.update(
                    idx,
                    Entry {
                        hash,
                        offset: dst_offset,
                    },
                );
                self.consumed_size = self.consumed_size - old_size + new_size;
                dst_offset += new_size;
            }
            Fold::Delete { idx, old_size } => {
                self.index.remove(idx);
                self.consumed_size -= old_size;
            }
            Fold::None => {}
        }

        // commit point: once this header is programmed, the swap area carries
        // the higher version and wins every future startup
        let version = self.active_area_version.wrapping_add(1);
        self.write_area_header(self.gc_area_addr, version)?;
        self.active_area_version = version;

        std::mem::swap(&mut self.active_area_addr, &mut self.gc_area_addr);
        self.free_space_offset = dst_offset;
        Ok(())
    }

    /// Byte-moves one record from the active area into the swap area through
    /// the transaction buffer. The bytes are bit-identical, so the CRC is
    /// not recomputed. Returns the destination offset just past the record.
    fn copy_record(&mut self, src_offset: u32, dst_offset: u32) -> Result<u32, StoreError> {
        let src_addr = self.active_area_addr + src_offset;

        let mut raw = [0u8; record::HEADER_LEN];
        self.bd.read(src_addr, &mut raw)?;
        let header = record::RecordHeader::decode(&raw);
        let record_len = header.record_size(self.bd.program_size(src_addr));

        if dst_offset + record_len > self.area_size() {
            return Err(StoreError::StorageFull);
        }

        let mut copied = 0u32;
        while copied < record_len {
            let n = ((record_len - copied) as usize).min(self.buf.len());
            let chunk = &mut self.buf[..n];
            self.bd.read(src_addr + copied, chunk)?;
            self.bd
                .program(self.gc_area_addr + dst_offset + copied, chunk)?;
            copied += n as u32;
        }
        Ok(dst_offset + record_len)
    }
}
