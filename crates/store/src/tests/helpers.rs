use crate::Store;
use blockdev::RamBlockDevice;

pub const SECTOR: u32 = 4096;
pub const PROGRAM: u32 = 16;

/// Standard two-sector test medium: 4 KiB sectors, 16-byte program pages,
/// byte reads.
pub fn ram_device() -> RamBlockDevice {
    RamBlockDevice::new(2 * SECTOR, 1, PROGRAM, SECTOR)
}

pub fn open_ram_store() -> Store<RamBlockDevice> {
    Store::open(ram_device(), 0, 2 * SECTOR).unwrap()
}

/// Size of the area-header record on the standard test medium.
pub fn area_header_size() -> u32 {
    record::record_size(10, 4, PROGRAM)
}

/// Size any record occupies on the standard test medium.
pub fn rec_size(key: &str, data_len: u32) -> u32 {
    record::record_size(key.len() as u32, data_len, PROGRAM)
}
