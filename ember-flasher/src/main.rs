// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware flasher for the ember bootloader.
//!
//! Usage:
//!   ember-flasher /dev/ttyUSB0 application.bin
//!
//! Exit codes: 0 on success, -1 on argument or port errors, 1 when the
//! transfer itself fails.

mod cli;
mod commands;
mod transport;

fn main() {
    std::process::exit(cli::run());
}
