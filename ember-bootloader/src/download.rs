// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Device-side download loop.
//!
//! Assembles frames from the UART, feeds them to the shared state machine,
//! and carries out the resulting flash and response I/O. Terminal states
//! persist their config mutations before this returns.

use ember_common::config::BootConfig;
use ember_common::download::{DlAction, DlState, Downloader};
use ember_common::protocol::{
    decode_frame, encode_response, RspCode, APP_ADDR, APP_SECTOR_COUNT, BYTE_TIMEOUT_MS,
    FLASH_WORD_SIZE, FRAME_OVERHEAD, FRAME_SOF, MAX_DATA_SIZE, MAX_FRAME_SIZE,
};

use crate::config;
use crate::flash::{Bank, FlashError, FlashStore};
use crate::serial::{DownloadLink, RxError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadError {
    /// The NACK budget ran out or the transfer was otherwise abandoned.
    Protocol,
    Flash(FlashError),
}

enum Recv {
    /// A complete candidate frame of this many bytes sits in the buffer.
    Frame(usize),
    /// No traffic; not an error and not NACKed.
    Timeout,
    /// Unframeable traffic (bad SOF, oversize LEN, line error).
    Malformed,
}

/// Receive and flash one application image. On success the config reflects
/// the new image (not yet bootable); on failure after the slot was touched
/// it reflects a failed application.
pub fn run(
    link: &mut DownloadLink,
    flash: &mut FlashStore,
    cfg: &mut BootConfig,
) -> Result<(), DownloadError> {
    let mut dl = Downloader::new();
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let mut flash_err: Option<FlashError> = None;

    defmt::info!("waiting for download to start");

    while !dl.is_terminal() {
        match receive_frame(link, &mut buf, dl.state() == DlState::Idle) {
            Recv::Timeout => continue,
            Recv::Malformed => {
                let action = dl.on_bad_frame();
                send_reply_for(link, &dl, action);
            }
            Recv::Frame(n) => match decode_frame(&buf[..n]) {
                Err(_) => {
                    defmt::warn!("malformed frame, sending NACK");
                    let action = dl.on_bad_frame();
                    send_reply_for(link, &dl, action);
                }
                Ok(frame) => match dl.on_frame(&frame) {
                    DlAction::Reply(code) => {
                        log_transition(&dl, code);
                        link.write_all(&encode_response(code));
                        if code == RspCode::Nack && dl.is_terminal() {
                            defmt::error!("NACK budget exhausted, aborting download");
                        }
                    }
                    DlAction::Write {
                        offset,
                        data,
                        first_write,
                    } => {
                        if first_write {
                            defmt::info!("first fragment arrived, erasing application slot");
                            if let Err(err) = flash.erase(Bank::Bank2, 0, APP_SECTOR_COUNT) {
                                defmt::error!("application slot erase failed");
                                flash_err = Some(err);
                                dl.on_flash_error();
                                continue;
                            }
                        }
                        if let Err(err) = program_fragment(flash, offset, data) {
                            defmt::error!(
                                "flash write failed at offset {=u32:#x}",
                                offset
                            );
                            flash_err = Some(err);
                            dl.on_flash_error();
                            continue;
                        }
                        defmt::info!(
                            "flashed fragment {=u32}/{=u32}",
                            dl.transfer().received_fragments,
                            dl.transfer().total_fragments
                        );
                        link.write_all(&encode_response(RspCode::Ack));
                    }
                },
            },
        }
    }

    if dl.apply_outcome(cfg) {
        if let Err(err) = config::save(flash, cfg) {
            defmt::error!("failed to persist download outcome");
            return Err(DownloadError::Flash(err));
        }
    }

    if dl.state() == DlState::Success {
        defmt::info!("download successful");
        Ok(())
    } else {
        defmt::error!("download failed");
        Err(flash_err.map(DownloadError::Flash).unwrap_or(DownloadError::Protocol))
    }
}

/// Read one frame off the wire: SOF, TYPE + LEN, then LEN payload bytes,
/// CRC, and EOF. Each byte carries its own deadline except the very first
/// in IDLE, which waits for the host indefinitely.
fn receive_frame(link: &mut DownloadLink, buf: &mut [u8], wait_forever: bool) -> Recv {
    let first_timeout = if wait_forever {
        None
    } else {
        Some(BYTE_TIMEOUT_MS)
    };
    buf[0] = match link.read_byte(first_timeout) {
        Ok(byte) => byte,
        Err(RxError::Timeout) => return Recv::Timeout,
        Err(RxError::Line) => return Recv::Malformed,
    };
    if buf[0] != FRAME_SOF {
        return Recv::Malformed;
    }

    if let Err(err) = link.read_exact(&mut buf[1..4], BYTE_TIMEOUT_MS) {
        return recv_err(err);
    }
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if len > MAX_DATA_SIZE {
        return Recv::Malformed;
    }

    // payload + CRC + EOF
    if let Err(err) = link.read_exact(&mut buf[4..len + FRAME_OVERHEAD], BYTE_TIMEOUT_MS) {
        return recv_err(err);
    }
    Recv::Frame(len + FRAME_OVERHEAD)
}

fn recv_err(err: RxError) -> Recv {
    match err {
        RxError::Timeout => Recv::Timeout,
        RxError::Line => Recv::Malformed,
    }
}

fn program_fragment(flash: &mut FlashStore, offset: u32, data: &[u8]) -> Result<(), FlashError> {
    // Pad the final short fragment to a flash-word boundary.
    let mut word_buf = [0xFFu8; MAX_DATA_SIZE];
    word_buf[..data.len()].copy_from_slice(data);
    let padded = data.len().div_ceil(FLASH_WORD_SIZE as usize) * FLASH_WORD_SIZE as usize;

    flash.program(APP_ADDR + offset, &word_buf[..padded])
}

fn send_reply_for(link: &mut DownloadLink, dl: &Downloader, action: DlAction<'_>) {
    if let DlAction::Reply(code) = action {
        link.write_all(&encode_response(code));
        if code == RspCode::Nack && dl.is_terminal() {
            defmt::error!("NACK budget exhausted, aborting download");
        }
    }
}

fn log_transition(dl: &Downloader, code: RspCode) {
    if code != RspCode::Ack {
        return;
    }
    match dl.state() {
        DlState::Header => defmt::info!("download start accepted, expecting header"),
        DlState::Data => defmt::info!(
            "header accepted: {=u32} bytes in {=u32} fragments, image crc {=u32:#x}",
            dl.transfer().image_size,
            dl.transfer().total_fragments,
            dl.transfer().image_crc
        ),
        DlState::Success => defmt::info!("end of transfer acknowledged"),
        _ => {}
    }
}
