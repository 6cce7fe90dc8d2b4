// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Common types and logic for the ember bootloader and its host flasher.
//!
//! Everything here is `no_std` and hardware-free: the wire protocol codec,
//! the persistent config block, the CRC adapter, the device-side download
//! state machine, and the boot decision helpers. The bootloader binary and
//! the host tool both build on this crate, so the two ends of the link
//! share one definition of every byte.

#![no_std]

pub mod boot;
pub mod config;
pub mod crc;
pub mod download;
pub mod protocol;

// Re-export commonly used types
pub use config::{BootConfig, RebootReason, CONFIG_VALID_MARKER};
pub use download::{DlAction, DlState, Downloader, MAX_NACK_BUDGET};
pub use protocol::{Command, Frame, FrameError, FrameType, RspCode};
pub use protocol::{APP_ADDR, APP_MAX_SIZE, CONFIG_ADDR, DOWNLOAD_BAUD_RATE};
pub use protocol::{FRAME_EOF, FRAME_SOF, MAX_DATA_SIZE, MAX_FRAME_SIZE, RSP_FRAME_SIZE};
