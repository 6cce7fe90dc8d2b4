// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the CRC32 adapter.

use ember_common::crc::{crc32, stored_crc, verify, CrcMismatch};

#[test]
fn test_known_vector() {
    // The CRC-32/ISO-HDLC check value.
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
}

#[test]
fn test_empty_input() {
    assert_eq!(crc32(&[]), 0x0000_0000);
}

#[test]
fn test_crc_is_deterministic() {
    let data: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
    assert_eq!(crc32(&data), crc32(&data));
}

#[test]
fn test_crc_sensitive_to_single_bit() {
    let mut data = vec![0u8; 256];
    let clean = crc32(&data);
    data[0] ^= 0x01;
    assert_ne!(crc32(&data), clean);
}

#[test]
fn test_verify_ok() {
    let data = b"ember";
    assert_eq!(verify(data, crc32(data)), Ok(()));
}

#[test]
fn test_verify_mismatch_reports_both_values() {
    let data = b"ember";
    let computed = crc32(data);
    assert_eq!(
        verify(data, 0x1234_5678),
        Err(CrcMismatch {
            expected: 0x1234_5678,
            computed,
        })
    );
}

#[test]
fn test_stored_crc_rejects_erased_flash_sentinels() {
    assert_eq!(stored_crc(0x0000_0000), None);
    assert_eq!(stored_crc(0xFFFF_FFFF), None);
}

#[test]
fn test_stored_crc_passes_real_values() {
    assert_eq!(stored_crc(0x0000_0001), Some(0x0000_0001));
    assert_eq!(stored_crc(0xCBF4_3926), Some(0xCBF4_3926));
}
