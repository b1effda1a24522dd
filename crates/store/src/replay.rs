//! Log replay: the cold-start scan that rebuilds the RAM index from the
//! active area.
//!
//! Starting just past the area header, records are read in sequence. Erased
//! space ends the log cleanly — the free-space offset lands on the first
//! erased byte. A corrupt record (torn append, bit rot) triggers a recovery
//! compaction instead: everything validated so far is copied into the swap
//! area, which becomes the new active area, and the corrupt tail is left
//! behind to be erased later.

use blockdev::BlockDevice;
use ramindex::Entry;
use record::{KeyAccess, RecordError};

use crate::gc::Fold;
use crate::{Store, StoreError, MAX_KEY_SIZE};

impl<B: BlockDevice> Store<B> {
    pub(crate) fn build_ram_index(&mut self) -> Result<(), StoreError> {
        let area_size = self.area_size();
        self.consumed_size = self.area_header_record_size(self.active_area_addr);

        let mut offset = self.consumed_size;
        while offset + (record::HEADER_LEN as u32) < area_size {
            let record_addr = self.active_area_addr + offset;
            let mut key_buf = [0u8; MAX_KEY_SIZE];
            let header = match record::read_record(
                &mut self.bd,
                &mut self.buf,
                record_addr,
                KeyAccess::Capture(&mut key_buf),
                None,
            ) {
                Ok(header) => header,
                // free space: the log ends here
                Err(RecordError::Erased) => break,
                Err(RecordError::Device(e)) => return Err(e.into()),
                // corrupt or torn record: compact the valid prefix and stop;
                // the collector sets the new free-space offset
                Err(_) => {
                    self.collect_garbage(Fold::None)?;
                    return Ok(());
                }
            };

            let key = &key_buf[..header.key_size as usize];
            let lookup = self.find_record(key)?;
            let found = lookup.existing.is_some();
            let delete = header.is_tombstone();

            let program_size = self.bd.program_size(record_addr);
            let record_len = header.record_size(program_size);

            // a tombstone for a key that was never added (or already
            // deleted) contributes nothing
            if delete && !found {
                offset += record_len;
                continue;
            }

            let old_size = lookup
                .existing
                .as_ref()
                .map(|e| record::record_size(key.len() as u32, e.data_size, program_size))
                .unwrap_or(0);

            let entry = Entry {
                hash: lookup.hash,
                offset,
            };
            if delete {
                self.index.remove(lookup.idx);
                self.consumed_size -= old_size;
            } else if found {
                self.index.update(lookup.idx, entry);
                self.consumed_size = self.consumed_size - old_size + record_len;
            } else {
                self.index.insert(lookup.idx, entry)?;
                self.consumed_size += record_len;
            }

            offset += record_len;
        }

        self.free_space_offset = offset;
        Ok(())
    }
}
