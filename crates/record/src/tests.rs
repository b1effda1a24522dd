use crate::crc::{crc16, CRC_INIT};
use crate::*;
use blockdev::RamBlockDevice;

fn device(program_size: u32) -> RamBlockDevice {
    RamBlockDevice::new(8192, 1, program_size, 4096)
}

fn scratch() -> Vec<u8> {
    vec![0u8; 128]
}

// --------------------- CRC ---------------------

#[test]
fn crc16_check_value() {
    // standard CRC-16/CCITT-FALSE check input
    assert_eq!(crc16(b"123456789", CRC_INIT), 0x29B1);
}

#[test]
fn crc16_empty_input_is_identity() {
    assert_eq!(crc16(&[], CRC_INIT), CRC_INIT);
    assert_eq!(crc16(&[], 0x1234), 0x1234);
}

#[test]
fn crc16_streams_across_concatenation() {
    let a = b"area header";
    let b = b" and payload bytes";
    let mut whole = Vec::new();
    whole.extend_from_slice(a);
    whole.extend_from_slice(b);

    assert_eq!(crc16(&whole, CRC_INIT), crc16(b, crc16(a, CRC_INIT)));
}

// --------------------- Header codec ---------------------

#[test]
fn header_encode_decode_round_trip() {
    let header = RecordHeader::new(b"alpha", &[1, 2, 3], 0);
    assert_eq!(header.magic, RECORD_MAGIC);
    assert_eq!(header.header_size, HEADER_LEN as u16);
    assert_eq!(header.key_size, 5);
    assert_eq!(header.data_size, 3);
    assert!(!header.is_tombstone());

    let decoded = RecordHeader::decode(&header.encode());
    assert_eq!(decoded, header);
}

#[test]
fn tombstone_header_sets_delete_flag() {
    let header = RecordHeader::new(b"gone", &[], DELETE_FLAG);
    assert!(header.is_tombstone());
    assert_eq!(header.data_size, 0);
}

#[test]
fn record_size_aligns_to_program_size() {
    // byte-granular medium: exact size
    assert_eq!(record_size(5, 3, 1), 18 + 5 + 3);
    // page-programmed medium: rounded up
    assert_eq!(record_size(5, 3, 16), 32);
    // exact multiple needs no padding
    assert_eq!(record_size(10, 4, 16), 32);
}

// --------------------- Write + read ---------------------

#[test]
fn write_then_read_round_trip() {
    let mut bd = device(16);
    let mut buf = scratch();

    let header = write_record(&mut bd, &mut buf, 0, b"alpha", &[1, 2, 3], 0).unwrap();
    assert_eq!(header.record_size(16), 48); // 18 + 5 + 3 -> 48

    let mut value = [0u8; 8];
    let read = read_record(
        &mut bd,
        &mut buf,
        0,
        KeyAccess::Validate(b"alpha"),
        Some(&mut value),
    )
    .unwrap();
    assert_eq!(read.data_size, 3);
    assert_eq!(&value[..3], &[1, 2, 3]);
}

#[test]
fn zero_length_value_round_trips() {
    let mut bd = device(16);
    let mut buf = scratch();

    write_record(&mut bd, &mut buf, 0, b"empty", &[], 0).unwrap();
    let read = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"empty"), None).unwrap();
    assert_eq!(read.data_size, 0);
}

#[test]
fn capture_copies_key_bytes() {
    let mut bd = device(16);
    let mut buf = scratch();
    write_record(&mut bd, &mut buf, 0, b"alpha", &[9], 0).unwrap();

    let mut key = [0u8; MAX_KEY_SIZE];
    let header = read_record(&mut bd, &mut buf, 0, KeyAccess::Capture(&mut key), None).unwrap();
    assert_eq!(&key[..header.key_size as usize], b"alpha");
}

#[test]
fn record_spanning_multiple_buffer_fills() {
    let mut bd = device(4);
    // deliberately tiny transaction buffer: header alone overflows one fill
    let mut buf = vec![0u8; 20];

    let value: Vec<u8> = (0..100).collect();
    write_record(&mut bd, &mut buf, 0, b"bigvalue", &value, 0).unwrap();

    let mut out = vec![0u8; 128];
    let header = read_record(
        &mut bd,
        &mut buf,
        0,
        KeyAccess::Validate(b"bigvalue"),
        Some(&mut out),
    )
    .unwrap();
    assert_eq!(header.data_size, 100);
    assert_eq!(&out[..100], &value[..]);
}

#[test]
fn tail_page_padding_is_zeroed() {
    let mut bd = device(16);
    let mut buf = scratch();

    let header = write_record(&mut bd, &mut buf, 0, b"k", &[0xAA; 3], 0).unwrap();
    let end = HEADER_LEN + 1 + 3;
    let total = header.record_size(16) as usize;
    assert!(bd.raw()[end..total].iter().all(|&b| b == 0));
}

// --------------------- Classification ---------------------

#[test]
fn erased_space_is_recognized() {
    let mut bd = device(16);
    let mut buf = scratch();
    let err = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"x"), None).unwrap_err();
    assert!(matches!(err, RecordError::Erased));

    // zero-erased media are recognized the same way
    let mut bd = device(16).with_erased_value(0x00);
    let err = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"x"), None).unwrap_err();
    assert!(matches!(err, RecordError::Erased));
}

#[test]
fn bad_magic_is_invalid() {
    let mut bd = device(16);
    let mut buf = scratch();
    write_record(&mut bd, &mut buf, 0, b"alpha", &[1], 0).unwrap();
    bd.raw_mut()[0] ^= 0x01;

    let err = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"alpha"), None).unwrap_err();
    assert!(matches!(err, RecordError::Invalid));
}

#[test]
fn corrupt_value_fails_crc() {
    let mut bd = device(16);
    let mut buf = scratch();
    write_record(&mut bd, &mut buf, 0, b"alpha", &[1, 2, 3], 0).unwrap();
    // flip one bit inside the value region
    bd.raw_mut()[HEADER_LEN + 5] ^= 0x80;

    let err = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"alpha"), None).unwrap_err();
    assert!(matches!(err, RecordError::Invalid));
}

#[test]
fn key_mismatch_is_reported() {
    let mut bd = device(16);
    let mut buf = scratch();
    write_record(&mut bd, &mut buf, 0, b"alpha", &[1], 0).unwrap();

    // same length, different bytes
    let err = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"alphb"), None).unwrap_err();
    assert!(matches!(err, RecordError::KeyMismatch));

    // different length short-circuits before any medium read
    let err = read_record(&mut bd, &mut buf, 0, KeyAccess::Validate(b"al"), None).unwrap_err();
    assert!(matches!(err, RecordError::KeyMismatch));
}

#[test]
fn short_value_buffer_reports_required_size() {
    let mut bd = device(16);
    let mut buf = scratch();
    write_record(&mut bd, &mut buf, 0, b"alpha", &[1, 2, 3, 4, 5], 0).unwrap();

    let mut small = [0u8; 2];
    let err = read_record(
        &mut bd,
        &mut buf,
        0,
        KeyAccess::Validate(b"alpha"),
        Some(&mut small),
    )
    .unwrap_err();
    assert!(matches!(err, RecordError::BufferTooSmall { required: 5 }));
}
