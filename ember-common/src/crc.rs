// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC32 adapter shared by both sides of the link.
//!
//! One definition (ISO HDLC: polynomial `0xEDB88320` reflected, init and
//! final XOR `0xFFFFFFFF`) covers frame CRCs, the config block CRC, and the
//! image CRC, so host and device values agree bit-for-bit. A hardware CRC
//! engine would slot in behind these two functions.

use crc::{Crc, CRC_32_ISO_HDLC};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrcMismatch {
    pub expected: u32,
    pub computed: u32,
}

pub fn verify(bytes: &[u8], expected: u32) -> Result<(), CrcMismatch> {
    let computed = crc32(bytes);
    if computed == expected {
        Ok(())
    } else {
        Err(CrcMismatch { expected, computed })
    }
}

/// Filter a CRC value read from persistent storage. All-zeros and all-ones
/// are what erased or never-written flash yields, so neither is accepted as
/// a stored checksum.
pub fn stored_crc(raw: u32) -> Option<u32> {
    match raw {
        0x0000_0000 | 0xFFFF_FFFF => None,
        value => Some(value),
    }
}
