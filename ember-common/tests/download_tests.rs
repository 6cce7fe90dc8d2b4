// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the device-side download state machine.

use ember_common::config::{BootConfig, RebootReason};
use ember_common::download::{DlAction, DlState, Downloader, MAX_NACK_BUDGET};
use ember_common::protocol::{Command, Frame, FrameType, RspCode, APP_MAX_SIZE};

fn start() -> Frame {
    Frame::command(Command::Start)
}

fn end() -> Frame {
    Frame::command(Command::End)
}

fn data(len: usize, fill: u8) -> Frame {
    Frame::data(&vec![fill; len]).unwrap()
}

/// A CMD frame with an empty payload, as in the malformed-traffic scenario.
fn empty_cmd() -> Frame {
    Frame {
        frame_type: FrameType::Cmd,
        payload: heapless::Vec::new(),
    }
}

fn assert_ack(action: DlAction<'_>) {
    assert_eq!(action, DlAction::Reply(RspCode::Ack));
}

fn assert_nack(action: DlAction<'_>) {
    assert_eq!(action, DlAction::Reply(RspCode::Nack));
}

/// Drive a fresh machine to the DATA state for a `size`-byte image.
fn at_data_state(size: u32) -> Downloader {
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));
    assert_ack(dl.on_frame(&Frame::header(size, 0xCBF4_3926)));
    assert_eq!(dl.state(), DlState::Data);
    dl
}

// =============================================================================
// IDLE state
// =============================================================================

#[test]
fn test_idle_accepts_start() {
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));
    assert_eq!(dl.state(), DlState::Header);
}

#[test]
fn test_idle_nacks_data_frame() {
    let mut dl = Downloader::new();
    assert_nack(dl.on_frame(&data(16, 0x11)));
    assert_eq!(dl.state(), DlState::Idle);
}

#[test]
fn test_idle_nacks_end_command() {
    let mut dl = Downloader::new();
    assert_nack(dl.on_frame(&end()));
    assert_eq!(dl.state(), DlState::Idle);
}

#[test]
fn test_idle_nacks_reserved_abort_command() {
    let mut dl = Downloader::new();
    assert_nack(dl.on_frame(&Frame::command(Command::Abort)));
    assert_eq!(dl.state(), DlState::Idle);
}

// =============================================================================
// HEADER state
// =============================================================================

#[test]
fn test_header_parses_size_and_crc() {
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));
    assert_ack(dl.on_frame(&Frame::header(5120, 0xDEAD_BEEF)));

    assert_eq!(dl.state(), DlState::Data);
    assert_eq!(dl.transfer().image_size, 5120);
    assert_eq!(dl.transfer().image_crc, 0xDEAD_BEEF);
    assert_eq!(dl.transfer().total_fragments, 5);
    assert_eq!(dl.transfer().received_fragments, 0);
}

#[test]
fn test_header_nacks_wrong_payload_len() {
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));
    let mut short = Frame::header(5120, 0);
    short.payload.truncate(4);
    assert_nack(dl.on_frame(&short));
    assert_eq!(dl.state(), DlState::Header);
}

#[test]
fn test_header_nacks_zero_size() {
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));
    assert_nack(dl.on_frame(&Frame::header(0, 0x1234_5678)));
    assert_eq!(dl.state(), DlState::Header);
}

#[test]
fn test_header_nacks_image_larger_than_slot() {
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));
    assert_nack(dl.on_frame(&Frame::header(APP_MAX_SIZE + 1, 0x1234_5678)));
    assert_eq!(dl.state(), DlState::Header);
}

// =============================================================================
// DATA state
// =============================================================================

#[test]
fn test_five_fragment_transfer() {
    let mut dl = at_data_state(5120);

    for i in 0..5u32 {
        let frame = data(1024, i as u8);
        match dl.on_frame(&frame) {
            DlAction::Write {
                offset,
                data,
                first_write,
            } => {
                assert_eq!(offset, i * 1024);
                assert_eq!(data.len(), 1024);
                assert_eq!(first_write, i == 0);
            }
            other => panic!("expected write, got {other:?}"),
        }
    }

    assert_eq!(dl.state(), DlState::Success);
    assert!(dl.write_started());
}

#[test]
fn test_erase_deferred_to_first_data_frame() {
    let dl = at_data_state(2048);
    // HEADER alone must not have touched the slot.
    assert!(!dl.write_started());
}

#[test]
fn test_short_final_fragment() {
    let mut dl = at_data_state(1500);
    assert_eq!(dl.transfer().total_fragments, 2);

    match dl.on_frame(&data(1024, 0xAA)) {
        DlAction::Write { offset: 0, .. } => {}
        other => panic!("expected write, got {other:?}"),
    }
    match dl.on_frame(&data(476, 0xBB)) {
        DlAction::Write { offset: 1024, data, .. } => assert_eq!(data.len(), 476),
        other => panic!("expected write, got {other:?}"),
    }
    assert_eq!(dl.state(), DlState::Success);
}

#[test]
fn test_end_command_terminates_transfer() {
    let mut dl = at_data_state(2048);
    match dl.on_frame(&data(1024, 0x01)) {
        DlAction::Write { .. } => {}
        other => panic!("expected write, got {other:?}"),
    }
    assert_ack(dl.on_frame(&end()));
    assert_eq!(dl.state(), DlState::Success);
}

#[test]
fn test_data_nacks_empty_data_frame() {
    let mut dl = at_data_state(2048);
    assert_nack(dl.on_frame(&data(0, 0)));
    assert_eq!(dl.state(), DlState::Data);
}

#[test]
fn test_data_nacks_unexpected_start() {
    let mut dl = at_data_state(2048);
    assert_nack(dl.on_frame(&start()));
    assert_eq!(dl.state(), DlState::Data);
}

// =============================================================================
// NACK budget
// =============================================================================

#[test]
fn test_three_malformed_frames_in_header_fail_the_download() {
    // Three zero-length payloads in a row while expecting the header.
    let mut dl = Downloader::new();
    assert_ack(dl.on_frame(&start()));

    for _ in 0..MAX_NACK_BUDGET - 1 {
        assert_nack(dl.on_frame(&empty_cmd()));
        assert_eq!(dl.state(), DlState::Header);
    }
    assert_nack(dl.on_frame(&empty_cmd()));
    assert_eq!(dl.state(), DlState::Failed);

    // Nothing was written, so the config must stay untouched.
    let mut cfg = BootConfig::default_new();
    let before = cfg;
    assert!(!dl.apply_outcome(&mut cfg));
    assert_eq!(cfg, before);
}

#[test]
fn test_ack_resets_nack_budget() {
    let mut dl = Downloader::new();
    assert_nack(dl.on_frame(&end()));
    assert_nack(dl.on_frame(&end()));
    // A valid frame lands before the budget runs out.
    assert_ack(dl.on_frame(&start()));
    assert_eq!(dl.state(), DlState::Header);

    // The budget starts over: two more NACKs do not kill the download.
    assert_nack(dl.on_frame(&empty_cmd()));
    assert_nack(dl.on_frame(&empty_cmd()));
    assert_eq!(dl.state(), DlState::Header);
}

#[test]
fn test_successful_write_resets_nack_budget() {
    let mut dl = at_data_state(3072);
    assert_nack(dl.on_frame(&empty_cmd()));
    assert_nack(dl.on_frame(&empty_cmd()));
    match dl.on_frame(&data(1024, 0x5A)) {
        DlAction::Write { .. } => {}
        other => panic!("expected write, got {other:?}"),
    }
    assert_nack(dl.on_frame(&empty_cmd()));
    assert_nack(dl.on_frame(&empty_cmd()));
    assert_eq!(dl.state(), DlState::Data);
}

#[test]
fn test_bad_frames_count_against_budget() {
    let mut dl = Downloader::new();
    for _ in 0..MAX_NACK_BUDGET {
        assert_nack(dl.on_bad_frame());
    }
    assert_eq!(dl.state(), DlState::Failed);
}

// =============================================================================
// Flash failure
// =============================================================================

#[test]
fn test_flash_error_fails_download() {
    let mut dl = at_data_state(2048);
    match dl.on_frame(&data(1024, 0x00)) {
        DlAction::Write { .. } => {}
        other => panic!("expected write, got {other:?}"),
    }
    dl.on_flash_error();
    assert_eq!(dl.state(), DlState::Failed);
    assert!(dl.is_terminal());
}

// =============================================================================
// Terminal config mutations
// =============================================================================

#[test]
fn test_success_persists_image_metadata() {
    let mut dl = at_data_state(5120);
    for i in 0..5u32 {
        let frame = data(1024, i as u8);
        let _ = dl.on_frame(&frame);
    }
    assert_eq!(dl.state(), DlState::Success);

    let mut cfg = BootConfig::default_new();
    assert!(dl.apply_outcome(&mut cfg));
    assert_eq!(cfg.reason(), Some(RebootReason::NormalBoot));
    assert!(cfg.is_flashed());
    // Not bootable until the orchestrator re-verifies the slot CRC.
    assert!(!cfg.is_bootable());
    assert_eq!(cfg.app_size, 5120);
    assert_eq!(cfg.app_crc, 0xCBF4_3926);
}

#[test]
fn test_failure_after_write_marks_app_failed() {
    let mut dl = at_data_state(2048);
    let frame = data(1024, 0x77);
    let _ = dl.on_frame(&frame);
    dl.on_flash_error();

    let mut cfg = BootConfig::default_new();
    cfg.mark_flashed(true);
    cfg.mark_bootable(true);
    assert!(dl.apply_outcome(&mut cfg));
    assert_eq!(cfg.reason(), Some(RebootReason::AppFailed));
    assert!(!cfg.is_flashed());
    assert!(!cfg.is_bootable());
}

#[test]
fn test_failure_before_write_leaves_config_alone() {
    let mut dl = Downloader::new();
    for _ in 0..MAX_NACK_BUDGET {
        let _ = dl.on_bad_frame();
    }
    assert_eq!(dl.state(), DlState::Failed);

    let mut cfg = BootConfig::default_new();
    cfg.mark_flashed(true);
    let before = cfg;
    assert!(!dl.apply_outcome(&mut cfg));
    assert_eq!(cfg, before);
}
