// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot decision helpers - pure logic without hardware dependencies.
//!
//! Reboot-reason arbitration and the image integrity verdict live here so
//! the orchestrator in the bootloader binary stays a thin wiring layer and
//! the decisions are testable on the host.

use crate::config::{BootConfig, RebootReason};
use crate::crc::stored_crc;

/// How long the user button is polled on a normal boot, and how often.
pub const BUTTON_WINDOW_MS: u32 = 5_000;
pub const BUTTON_POLL_MS: u32 = 1;

/// Why the device is entering download mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadTrigger {
    FirstBoot,
    Requested,
    AppFailed,
    /// CRC-valid block carrying a reason value this firmware does not know.
    UnknownReason,
    Button,
}

/// Classify the persisted reboot reason. `None` means a normal boot: the
/// caller polls the button before deciding.
pub fn mandatory_download(reason: Option<RebootReason>) -> Option<DownloadTrigger> {
    match reason {
        Some(RebootReason::FirstTimeBoot) => Some(DownloadTrigger::FirstBoot),
        Some(RebootReason::DlRequest) => Some(DownloadTrigger::Requested),
        Some(RebootReason::AppFailed) => Some(DownloadTrigger::AppFailed),
        Some(RebootReason::NormalBoot) => None,
        None => Some(DownloadTrigger::UnknownReason),
    }
}

/// Outcome of the stored-image integrity check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageCheck {
    Bootable,
    /// No complete image has been written since the last erase.
    NoImage,
    /// The stored CRC is an erased-flash sentinel, not a checksum.
    NoStoredCrc,
    CrcMismatch { expected: u32, computed: u32 },
}

/// Verify the stored image against the config metadata. `compute` receives
/// the image size and returns the CRC32 over the application slot prefix of
/// that length.
pub fn check_image(cfg: &BootConfig, compute: impl FnOnce(u32) -> u32) -> ImageCheck {
    if !cfg.is_flashed() || cfg.app_size == 0 {
        return ImageCheck::NoImage;
    }
    let Some(expected) = stored_crc(cfg.app_crc) else {
        return ImageCheck::NoStoredCrc;
    };
    let computed = compute(cfg.app_size);
    if computed == expected {
        ImageCheck::Bootable
    } else {
        ImageCheck::CrcMismatch { expected, computed }
    }
}

/// Erased or never-programmed flash yields all-ones or (on some parts)
/// all-zeros; neither is a vector table entry worth jumping through.
pub fn plausible_vector_word(word: u32) -> bool {
    word != 0x0000_0000 && word != 0xFFFF_FFFF
}
