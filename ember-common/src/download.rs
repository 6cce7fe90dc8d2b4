// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device-side download state machine - pure logic without hardware
//! dependencies.
//!
//! The machine consumes decoded frames and emits actions (respond, or
//! program a fragment); the bootloader's download loop performs the UART and
//! flash I/O and reports flash failures back. Keeping the transitions here
//! makes the whole protocol table testable on the host.

use crate::config::{BootConfig, RebootReason};
use crate::protocol::{total_fragments, Command, Frame, FrameType, RspCode, APP_MAX_SIZE, MAX_DATA_SIZE};

/// Consecutive NACKs the device sends before giving up.
pub const MAX_NACK_BUDGET: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DlState {
    Idle,
    Header,
    Data,
    Success,
    Failed,
}

/// Metadata parsed from the HEADER frame plus fragment accounting.
#[derive(Clone, Copy, Debug, Default)]
pub struct Transfer {
    pub image_size: u32,
    pub image_crc: u32,
    pub total_fragments: u32,
    pub received_fragments: u32,
}

/// What the download loop must do with the frame it just fed in.
#[derive(Debug, PartialEq, Eq)]
pub enum DlAction<'a> {
    /// Send the response and continue.
    Reply(RspCode),
    /// Erase the application slot first if `first_write`, program `data` at
    /// `offset` within the slot, then ACK. On flash failure the caller
    /// reports [`Downloader::on_flash_error`] and sends nothing.
    Write {
        offset: u32,
        data: &'a [u8],
        first_write: bool,
    },
}

pub struct Downloader {
    state: DlState,
    transfer: Transfer,
    nacks_in_a_row: u8,
    write_started: bool,
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            state: DlState::Idle,
            transfer: Transfer::default(),
            nacks_in_a_row: 0,
            write_started: false,
        }
    }

    pub fn state(&self) -> DlState {
        self.state
    }

    pub fn transfer(&self) -> &Transfer {
        &self.transfer
    }

    /// The slot erase has happened; a failure from here on leaves the slot
    /// contents undefined.
    pub fn write_started(&self) -> bool {
        self.write_started
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, DlState::Success | DlState::Failed)
    }

    /// Feed one well-formed frame.
    pub fn on_frame<'a>(&mut self, frame: &'a Frame) -> DlAction<'a> {
        match self.state {
            DlState::Idle => match frame.command_byte() {
                Some(Command::Start) => {
                    self.state = DlState::Header;
                    self.ack()
                }
                _ => self.nack(),
            },

            DlState::Header => match frame.header_fields() {
                Some((size, crc)) if size > 0 && size <= APP_MAX_SIZE => {
                    self.transfer = Transfer {
                        image_size: size,
                        image_crc: crc,
                        total_fragments: total_fragments(size),
                        received_fragments: 0,
                    };
                    self.state = DlState::Data;
                    self.ack()
                }
                _ => self.nack(),
            },

            DlState::Data => {
                if frame.frame_type == FrameType::Data && !frame.payload.is_empty() {
                    let offset = self.transfer.received_fragments * MAX_DATA_SIZE as u32;
                    let first_write = !self.write_started;
                    self.write_started = true;
                    self.transfer.received_fragments += 1;
                    if self.transfer.received_fragments >= self.transfer.total_fragments {
                        self.state = DlState::Success;
                    }
                    self.nacks_in_a_row = 0;
                    DlAction::Write {
                        offset,
                        data: &frame.payload,
                        first_write,
                    }
                } else if frame.command_byte() == Some(Command::End) {
                    self.state = DlState::Success;
                    self.ack()
                } else {
                    self.nack()
                }
            }

            // Terminal; the loop should have exited already.
            DlState::Success | DlState::Failed => self.nack(),
        }
    }

    /// Feed a receive-level failure (bad SOF/EOF, CRC mismatch, line error).
    pub fn on_bad_frame(&mut self) -> DlAction<'static> {
        self.nack()
    }

    /// The erase or program for the last [`DlAction::Write`] failed.
    pub fn on_flash_error(&mut self) {
        self.state = DlState::Failed;
    }

    /// Terminal config mutations. Returns whether the config changed and
    /// must be persisted; a failure before any write leaves it untouched.
    pub fn apply_outcome(&self, cfg: &mut BootConfig) -> bool {
        match self.state {
            DlState::Success => {
                cfg.set_reason(RebootReason::NormalBoot);
                cfg.mark_flashed(true);
                cfg.mark_bootable(false);
                cfg.app_size = self.transfer.image_size;
                cfg.app_crc = self.transfer.image_crc;
                true
            }
            DlState::Failed if self.write_started => {
                cfg.set_reason(RebootReason::AppFailed);
                cfg.mark_flashed(false);
                cfg.mark_bootable(false);
                true
            }
            _ => false,
        }
    }

    fn ack(&mut self) -> DlAction<'static> {
        self.nacks_in_a_row = 0;
        DlAction::Reply(RspCode::Ack)
    }

    fn nack(&mut self) -> DlAction<'static> {
        self.nacks_in_a_row += 1;
        if self.nacks_in_a_row >= MAX_NACK_BUDGET {
            self.state = DlState::Failed;
        }
        DlAction::Reply(RspCode::Nack)
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}
