// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface and exit-code mapping.

use std::path::PathBuf;

use clap::Parser;
use ember_common::protocol::DOWNLOAD_BAUD_RATE;

use crate::commands;
use crate::transport::Transport;

pub const EXIT_OK: i32 = 0;
/// Argument or port errors, including an unreadable image file.
pub const EXIT_USAGE: i32 = -1;
pub const EXIT_PROTOCOL: i32 = 1;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "ember-flasher")]
#[command(about = "Stream an application image to the ember bootloader", version)]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyUSB0 or COM3)
    pub port: String,

    /// Application image to flash
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Download link baud rate; must match the bootloader build
    #[arg(long, default_value_t = DOWNLOAD_BAUD_RATE)]
    pub baud: u32,

    /// Pause between transmitted bytes, in microseconds, for the device's
    /// single-byte receive path (0 disables the pacing)
    #[arg(long, default_value_t = 50)]
    pub inter_byte_us: u64,
}

pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return EXIT_USAGE;
        }
    };

    println!(
        "ember-flasher v{} ({} baud)",
        env!("CARGO_PKG_VERSION"),
        cli.baud
    );

    let image = match commands::load_image(&cli.image) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("error: {err:#}");
            return EXIT_USAGE;
        }
    };

    let mut transport = match Transport::open(&cli.port, cli.baud, cli.inter_byte_us) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!("error: {err:#}");
            return EXIT_USAGE;
        }
    };

    match commands::flash_image(&mut transport, &image) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_PROTOCOL
        }
    }
}
