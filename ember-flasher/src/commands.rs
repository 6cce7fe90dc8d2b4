// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host-side download flow: IDLE -> HEADER -> DATA -> DATA_COMPLETE ->
//! SUCCESS or FAILED, one ACKed frame per transition.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use ember_common::crc::crc32;
use ember_common::protocol::{
    total_fragments, Command, Frame, APP_MAX_SIZE, MAX_DATA_SIZE,
};

use crate::transport::{Transport, ERASE_RESPONSE_TIMEOUT_MS, RESPONSE_TIMEOUT_MS};

pub struct Image {
    pub data: Vec<u8>,
    pub crc: u32,
}

/// Read the application binary, enforce the slot cap, compute its CRC32.
pub fn load_image(path: &Path) -> Result<Image> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if data.is_empty() {
        bail!("{} is empty", path.display());
    }
    if data.len() as u64 > APP_MAX_SIZE as u64 {
        bail!(
            "{} is {} bytes; the application slot holds {} bytes",
            path.display(),
            data.len(),
            APP_MAX_SIZE
        );
    }

    let crc = crc32(&data);
    println!(
        "Image: {} ({} bytes, CRC32: 0x{:08x})",
        path.display(),
        data.len(),
        crc
    );
    Ok(Image { data, crc })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HostState {
    Idle,
    Header,
    Data,
    DataComplete,
    Success,
    Failed,
}

/// Drive the transfer to completion.
pub fn flash_image(transport: &mut Transport, image: &Image) -> Result<()> {
    let size = image.data.len() as u32;
    let total = total_fragments(size);

    let pb = ProgressBar::new(image.data.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut state = HostState::Idle;
    let mut sent: u32 = 0;
    let mut failure: Option<anyhow::Error> = None;

    loop {
        state = match state {
            HostState::Idle => {
                println!("Requesting download start...");
                match transport.send_frame(&Frame::command(Command::Start), RESPONSE_TIMEOUT_MS) {
                    Ok(()) => HostState::Header,
                    Err(err) => {
                        failure = Some(err.context("device did not accept the start command"));
                        HostState::Failed
                    }
                }
            }

            HostState::Header => {
                match transport.send_frame(&Frame::header(size, image.crc), RESPONSE_TIMEOUT_MS) {
                    Ok(()) => HostState::Data,
                    Err(err) => {
                        failure = Some(err.context("device did not accept the header"));
                        HostState::Failed
                    }
                }
            }

            HostState::Data => {
                let offset = sent as usize * MAX_DATA_SIZE;
                let chunk = &image.data[offset..(offset + MAX_DATA_SIZE).min(image.data.len())];
                let frame = Frame::data(chunk).ok_or_else(|| anyhow!("fragment too large"))?;

                // The device erases the whole slot before ACKing fragment 0.
                let timeout = if sent == 0 {
                    ERASE_RESPONSE_TIMEOUT_MS
                } else {
                    RESPONSE_TIMEOUT_MS
                };

                match transport.send_frame(&frame, timeout) {
                    Ok(()) => {
                        sent += 1;
                        pb.set_position((offset + chunk.len()) as u64);
                        if sent == total {
                            HostState::DataComplete
                        } else {
                            HostState::Data
                        }
                    }
                    Err(err) => {
                        failure =
                            Some(err.context(format!("transfer failed at fragment {sent}/{total}")));
                        HostState::Failed
                    }
                }
            }

            HostState::DataComplete => {
                pb.finish_with_message("transfer complete");
                match transport.send_frame_skip_ack(&Frame::command(Command::End)) {
                    Ok(()) => HostState::Success,
                    Err(err) => {
                        failure = Some(err.context("failed to send the end command"));
                        HostState::Failed
                    }
                }
            }

            HostState::Success => {
                println!();
                println!("Image flashed successfully; the device verifies and boots it now.");
                return Ok(());
            }

            HostState::Failed => {
                pb.abandon();
                return Err(failure
                    .take()
                    .unwrap_or_else(|| anyhow!("download failed on {}", transport.port_name())));
            }
        };
    }
}
