// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the persistent config block.

use ember_common::config::{
    BootConfig, RebootReason, CONFIG_BLOCK_SIZE, CONFIG_VALID_MARKER, REASON_APP_FAILED,
    REASON_DL_REQUEST, REASON_FIRST_TIME_BOOT, REASON_NORMAL_BOOT,
};

fn sealed(mut cfg: BootConfig) -> BootConfig {
    cfg.seal();
    cfg
}

fn sample_config() -> BootConfig {
    let mut cfg = BootConfig::default_new();
    cfg.set_reason(RebootReason::NormalBoot);
    cfg.mark_flashed(true);
    cfg.app_size = 5120;
    cfg.app_crc = 0xCBF4_3926;
    cfg
}

// --- Layout tests ---

#[test]
fn test_block_size_is_64_bytes() {
    assert_eq!(CONFIG_BLOCK_SIZE, 64);
}

#[test]
fn test_valid_marker_value() {
    assert_eq!(CONFIG_VALID_MARKER, 0xDEAD_BEEF);
}

#[test]
fn test_reboot_reason_raw_values() {
    assert_eq!(REASON_FIRST_TIME_BOOT, 0xAFAF_AFAF);
    assert_eq!(REASON_NORMAL_BOOT, 0xBEEF_FEED);
    assert_eq!(REASON_DL_REQUEST, 0xDEAD_BEEF);
    assert_eq!(REASON_APP_FAILED, 0xBAAD_F00D);
}

#[test]
fn test_reboot_reason_round_trip() {
    for reason in [
        RebootReason::FirstTimeBoot,
        RebootReason::NormalBoot,
        RebootReason::DlRequest,
        RebootReason::AppFailed,
    ] {
        assert_eq!(RebootReason::from_raw(reason.as_raw()), Some(reason));
    }
    assert_eq!(RebootReason::from_raw(0x1234_5678), None);
}

// --- Defaults tests ---

#[test]
fn test_defaults_shape() {
    let cfg = BootConfig::default_new();
    assert_eq!(cfg.reason(), Some(RebootReason::FirstTimeBoot));
    assert!(!cfg.is_bootable());
    assert!(!cfg.is_flashed());
    assert_eq!(cfg.app_size, 0);
    assert_eq!(cfg.app_crc, 0);
    assert_eq!(cfg.reserved, [0u32; 10]);
    assert_eq!(cfg.valid_marker, CONFIG_VALID_MARKER);
}

#[test]
fn test_defaults_valid_once_sealed() {
    assert!(sealed(BootConfig::default_new()).is_valid());
}

// --- Seal / validate tests ---

#[test]
fn test_seal_then_validate() {
    assert!(sealed(sample_config()).is_valid());
}

#[test]
fn test_mutation_after_seal_invalidates() {
    let mut cfg = sealed(sample_config());
    cfg.app_size += 1;
    assert!(!cfg.is_valid());
}

#[test]
fn test_bad_marker_invalidates() {
    let mut cfg = sample_config();
    cfg.valid_marker = 0xDEAD_BEEE;
    cfg.seal();
    // CRC is consistent, but the marker is wrong.
    assert!(!cfg.is_valid());
}

#[test]
fn test_save_load_law_preserves_fields() {
    let cfg = sealed(sample_config());
    let mut raw = [0u8; CONFIG_BLOCK_SIZE];
    raw.copy_from_slice(cfg.as_bytes());

    let loaded = BootConfig::from_bytes(&raw);
    assert!(loaded.is_valid());
    assert_eq!(loaded.reboot_reason, cfg.reboot_reason);
    assert_eq!(loaded.app_bootable, cfg.app_bootable);
    assert_eq!(loaded.app_flashed, cfg.app_flashed);
    assert_eq!(loaded.app_size, cfg.app_size);
    assert_eq!(loaded.app_crc, cfg.app_crc);
    assert_eq!(loaded.reserved, cfg.reserved);
}

// --- Recovery tests ---

#[test]
fn test_erased_flash_reads_invalid() {
    // Fresh device: the config sector is all 0xFF.
    let blank = BootConfig::from_bytes(&[0xFF; CONFIG_BLOCK_SIZE]);
    assert!(!blank.is_valid());
}

#[test]
fn test_all_zero_block_reads_invalid() {
    let zeroed = BootConfig::from_bytes(&[0x00; CONFIG_BLOCK_SIZE]);
    assert!(!zeroed.is_valid());
}

#[test]
fn test_torn_save_reads_invalid() {
    // Power loss mid-program: a prefix of the new block over erased flash.
    let cfg = sealed(sample_config());
    let mut raw = [0xFFu8; CONFIG_BLOCK_SIZE];
    raw[..24].copy_from_slice(&cfg.as_bytes()[..24]);
    assert!(!BootConfig::from_bytes(&raw).is_valid());
}

#[test]
fn test_single_bit_flip_in_storage_reads_invalid() {
    let cfg = sealed(sample_config());
    let mut raw = [0u8; CONFIG_BLOCK_SIZE];
    raw.copy_from_slice(cfg.as_bytes());
    raw[10] ^= 0x04;
    assert!(!BootConfig::from_bytes(&raw).is_valid());
}
