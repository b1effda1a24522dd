//! Area management: identifying the active half at startup, the erase
//! discipline, and the area-header record.

use byteorder::{ByteOrder, LittleEndian};

use blockdev::BlockDevice;
use record::{KeyAccess, RecordError};

use crate::{Store, StoreError, AREA_HEADER_KEY, AREA_HEADER_VALUE_LEN, INITIAL_AREA_VERSION};

/// Wrap-aware area-version comparison: `a` is newer than `b` iff
/// `(a - b) mod 2^16` lies in `[1, 2^15)`. This subsumes the wrap special
/// case where version 0 succeeds 0xFFFF.
pub(crate) fn version_newer(a: u16, b: u16) -> bool {
    let delta = a.wrapping_sub(b);
    delta != 0 && delta < 0x8000
}

impl<B: BlockDevice> Store<B> {
    /// On-medium size of an area-header record at `area_addr`.
    pub(crate) fn area_header_record_size(&self, area_addr: u32) -> u32 {
        record::record_size(
            AREA_HEADER_KEY.len() as u32,
            AREA_HEADER_VALUE_LEN as u32,
            self.bd.program_size(area_addr),
        )
    }

    /// Erases one area: sectors after the first, then the first sector.
    ///
    /// Single-sector erase is atomic, so ordering the header sector last
    /// means an interrupted erase can only leave the area headerless after
    /// its old header was the final thing standing — versions on the two
    /// halves stay distinguishable across any interruption.
    pub(crate) fn erase_area(&mut self, area_addr: u32) -> Result<(), StoreError> {
        let erase_size = self.bd.erase_size(area_addr);
        let area_size = self.area_size();
        if erase_size < area_size {
            self.bd.erase(area_addr + erase_size, area_size - erase_size)?;
        }
        self.bd.erase(area_addr, erase_size)?;
        Ok(())
    }

    /// Writes the area-header record at `area_addr` offset 0. For a GC this
    /// is the commit point that transfers authority between the halves.
    pub(crate) fn write_area_header(
        &mut self,
        area_addr: u32,
        version: u16,
    ) -> Result<(), StoreError> {
        let mut value = [0u8; AREA_HEADER_VALUE_LEN];
        LittleEndian::write_u16(&mut value[0..2], version);
        LittleEndian::write_u16(&mut value[2..4], record::FORMAT_VERSION as u16);
        record::write_record(&mut self.bd, &mut self.buf, area_addr, AREA_HEADER_KEY, &value, 0)?;
        Ok(())
    }

    /// Reads the area-header record of the half at `area_addr`. Returns the
    /// area version when valid, `None` when the half holds anything else
    /// (erased space, a torn header, a foreign record). Device errors abort.
    fn check_area(&mut self, area_addr: u32) -> Result<Option<u16>, StoreError> {
        let mut value = [0u8; AREA_HEADER_VALUE_LEN];
        match record::read_record(
            &mut self.bd,
            &mut self.buf,
            area_addr,
            KeyAccess::Validate(AREA_HEADER_KEY),
            Some(&mut value),
        ) {
            Ok(_) => Ok(Some(LittleEndian::read_u16(&value[0..2]))),
            Err(RecordError::Device(e)) => Err(e.into()),
            Err(_) => Ok(None),
        }
    }

    /// Identifies the active and swap halves, formatting a fresh medium.
    pub(crate) fn setup_areas(&mut self) -> Result<(), StoreError> {
        let lower = self.start_addr;
        let upper = self.start_addr + self.area_size();

        let lower_version = self.check_area(lower)?;
        let upper_version = self.check_area(upper)?;

        match (lower_version, upper_version) {
            (Some(a), Some(b)) => {
                // equal versions cannot be produced by the GC protocol
                if a == b {
                    return Err(StoreError::InvalidData);
                }
                if version_newer(a, b) {
                    self.activate(lower, upper, a);
                } else {
                    self.activate(upper, lower, b);
                }
            }
            (Some(a), None) => self.activate(lower, upper, a),
            (None, Some(b)) => self.activate(upper, lower, b),
            (None, None) => {
                self.erase_area(lower)?;
                self.write_area_header(lower, INITIAL_AREA_VERSION)?;
                self.activate(lower, upper, INITIAL_AREA_VERSION);
            }
        }
        Ok(())
    }

    fn activate(&mut self, active: u32, swap: u32, version: u16) {
        self.active_area_addr = active;
        self.gc_area_addr = swap;
        self.active_area_version = version;
    }
}
