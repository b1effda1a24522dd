use crate::{BdError, BlockDevice, FileBlockDevice, RamBlockDevice};
use tempfile::tempdir;

#[test]
fn ram_program_and_read_back() {
    let mut bd = RamBlockDevice::new(4096, 1, 16, 4096);
    bd.program(32, &[0xAB; 16]).unwrap();

    let mut buf = [0u8; 16];
    bd.read(32, &mut buf).unwrap();
    assert_eq!(buf, [0xAB; 16]);

    // surrounding bytes stay erased
    let mut before = [0u8; 1];
    bd.read(31, &mut before).unwrap();
    assert_eq!(before, [0xFF]);
}

#[test]
fn ram_rejects_misaligned_program() {
    let mut bd = RamBlockDevice::new(4096, 1, 16, 4096);
    assert!(matches!(
        bd.program(8, &[0u8; 16]),
        Err(BdError::Misaligned { .. })
    ));
    assert!(matches!(
        bd.program(16, &[0u8; 9]),
        Err(BdError::Misaligned { .. })
    ));
}

#[test]
fn ram_rejects_out_of_bounds() {
    let mut bd = RamBlockDevice::new(4096, 1, 16, 4096);
    let mut buf = [0u8; 32];
    assert!(matches!(
        bd.read(4080, &mut buf),
        Err(BdError::OutOfBounds { .. })
    ));
    assert!(matches!(
        bd.erase(4096, 4096),
        Err(BdError::OutOfBounds { .. })
    ));
}

#[test]
fn ram_erase_restores_erased_value() {
    let mut bd = RamBlockDevice::new(8192, 1, 16, 4096);
    bd.program(0, &[0x00; 16]).unwrap();
    bd.erase(0, 4096).unwrap();
    let mut buf = [0u8; 16];
    bd.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 16]);
}

#[test]
fn ram_erased_value_zero() {
    let bd = RamBlockDevice::new(4096, 1, 1, 4096).with_erased_value(0x00);
    assert!(bd.raw().iter().all(|&b| b == 0x00));
}

#[test]
fn ram_power_cut_truncates_program() {
    let mut bd = RamBlockDevice::new(4096, 1, 16, 4096);
    bd.cut_power_after(4);

    let err = bd.program(0, &[0xAA; 16]).unwrap_err();
    assert!(matches!(err, BdError::PowerCut));

    // only the first 4 bytes reached the medium
    assert_eq!(&bd.raw()[..4], &[0xAA; 4]);
    assert_eq!(&bd.raw()[4..16], &[0xFF; 12]);

    // the budget is spent: later programs also fail until power is restored
    assert!(matches!(bd.program(16, &[0xBB; 16]), Err(BdError::PowerCut)));
    bd.restore_power();
    bd.program(16, &[0xBB; 16]).unwrap();
}

#[test]
fn file_device_round_trip_and_persistence() {
    let dir = tempdir().unwrap();
    let img = dir.path().join("store.img");

    {
        let mut bd = FileBlockDevice::open(&img, 8192, 1, 16, 4096).unwrap();
        bd.program(64, &[0x5A; 16]).unwrap();
    }

    // fresh handle sees the programmed bytes and an erased tail
    let mut bd = FileBlockDevice::open(&img, 8192, 1, 16, 4096).unwrap();
    let mut buf = [0u8; 16];
    bd.read(64, &mut buf).unwrap();
    assert_eq!(buf, [0x5A; 16]);
    bd.read(4096, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 16]);

    bd.erase(0, 4096).unwrap();
    bd.read(64, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 16]);
}

#[test]
fn file_device_rejects_misaligned_erase() {
    let dir = tempdir().unwrap();
    let img = dir.path().join("store.img");
    let mut bd = FileBlockDevice::open(&img, 8192, 1, 16, 4096).unwrap();
    assert!(matches!(
        bd.erase(100, 4096),
        Err(BdError::Misaligned { .. })
    ));
}
