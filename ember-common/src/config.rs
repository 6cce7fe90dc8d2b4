// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Persistent configuration block.
//!
//! One erase-sector at a fixed flash address holds a single 64-byte block:
//! boot reason, image metadata, a validity marker, and a CRC over everything
//! before it. A block is valid iff the marker matches and the CRC checks
//! out; anything else (fresh device, torn save) reads as defaults.

use core::mem::size_of;

use crate::crc::{crc32, verify};

/// Sentinel in [`BootConfig::valid_marker`].
pub const CONFIG_VALID_MARKER: u32 = 0xDEAD_BEEF;

// Reboot reason raw values.
pub const REASON_FIRST_TIME_BOOT: u32 = 0xAFAF_AFAF;
pub const REASON_NORMAL_BOOT: u32 = 0xBEEF_FEED;
pub const REASON_DL_REQUEST: u32 = 0xDEAD_BEEF;
pub const REASON_APP_FAILED: u32 = 0xBAAD_F00D;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootReason {
    FirstTimeBoot,
    NormalBoot,
    DlRequest,
    AppFailed,
}

impl RebootReason {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            REASON_FIRST_TIME_BOOT => Some(Self::FirstTimeBoot),
            REASON_NORMAL_BOOT => Some(Self::NormalBoot),
            REASON_DL_REQUEST => Some(Self::DlRequest),
            REASON_APP_FAILED => Some(Self::AppFailed),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::FirstTimeBoot => REASON_FIRST_TIME_BOOT,
            Self::NormalBoot => REASON_NORMAL_BOOT,
            Self::DlRequest => REASON_DL_REQUEST,
            Self::AppFailed => REASON_APP_FAILED,
        }
    }
}

// --- BootConfig (repr(C), 64 bytes) ---

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootConfig {
    pub reboot_reason: u32,
    pub app_bootable: u8,   // last integrity check passed
    pub app_flashed: u8,    // a complete image was written
    pub _pad: [u8; 2],      // written as zero
    pub app_size: u32,      // bytes written for the current image
    pub app_crc: u32,       // expected CRC32 of the image
    pub reserved: [u32; 10],
    pub valid_marker: u32,  // CONFIG_VALID_MARKER
    pub config_crc: u32,    // CRC32 over all preceding bytes
}

pub const CONFIG_BLOCK_SIZE: usize = size_of::<BootConfig>();
const CRC_PREFIX_LEN: usize = CONFIG_BLOCK_SIZE - 4;

// Compile-time size check
const _: () = assert!(size_of::<BootConfig>() == 64);

impl BootConfig {
    pub fn default_new() -> Self {
        Self {
            reboot_reason: REASON_FIRST_TIME_BOOT,
            app_bootable: 0,
            app_flashed: 0,
            _pad: [0; 2],
            app_size: 0,
            app_crc: 0,
            reserved: [0; 10],
            valid_marker: CONFIG_VALID_MARKER,
            config_crc: 0,
        }
    }

    pub fn reason(&self) -> Option<RebootReason> {
        RebootReason::from_raw(self.reboot_reason)
    }

    pub fn set_reason(&mut self, reason: RebootReason) {
        self.reboot_reason = reason.as_raw();
    }

    pub fn is_bootable(&self) -> bool {
        self.app_bootable != 0
    }

    pub fn mark_bootable(&mut self, bootable: bool) {
        self.app_bootable = bootable as u8;
    }

    pub fn is_flashed(&self) -> bool {
        self.app_flashed != 0
    }

    pub fn mark_flashed(&mut self, flashed: bool) {
        self.app_flashed = flashed as u8;
    }

    /// Recompute `config_crc` over the block prefix. Called by every save.
    pub fn seal(&mut self) {
        self.config_crc = crc32(&self.as_bytes()[..CRC_PREFIX_LEN]);
    }

    /// Marker and CRC both check out.
    pub fn is_valid(&self) -> bool {
        self.valid_marker == CONFIG_VALID_MARKER
            && verify(&self.as_bytes()[..CRC_PREFIX_LEN], self.config_crc).is_ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, CONFIG_BLOCK_SIZE) }
    }

    /// Reinterpret a raw block read from flash. Every field is plain old
    /// data, so any byte pattern is a representable (if invalid) config.
    pub fn from_bytes(raw: &[u8; CONFIG_BLOCK_SIZE]) -> Self {
        unsafe { core::ptr::read_unaligned(raw.as_ptr() as *const Self) }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::default_new()
    }
}
