// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport layer for bootloader communication.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serialport::SerialPort;

use ember_common::protocol::{decode_response, Frame, RspCode, MAX_FRAME_SIZE, RSP_FRAME_SIZE};

/// Default wait for the device's ACK/NACK in milliseconds.
pub const RESPONSE_TIMEOUT_MS: u64 = 5_000;
/// The device erases the whole application slot before ACKing the first
/// DATA frame, which takes a while on 128 KiB sectors.
pub const ERASE_RESPONSE_TIMEOUT_MS: u64 = 60_000;

/// Retransmissions of one frame before giving up.
const MAX_NACK_RETRIES: u32 = 3;

pub struct Transport {
    port: Box<dyn SerialPort>,
    inter_byte_delay: Duration,
}

impl Transport {
    pub fn open(port_name: &str, baud: u32, inter_byte_us: u64) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(Duration::from_millis(RESPONSE_TIMEOUT_MS))
            .open()
            .with_context(|| format!("failed to open serial port {port_name}"))?;

        Ok(Self {
            port,
            inter_byte_delay: Duration::from_micros(inter_byte_us),
        })
    }

    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    /// Send a frame and wait for the ACK; a NACK triggers retransmission of
    /// the same frame up to the retry limit.
    pub fn send_frame(&mut self, frame: &Frame, response_timeout_ms: u64) -> Result<()> {
        self.write_frame(frame)?;

        let mut nacks = 0;
        loop {
            match self.read_response(response_timeout_ms)? {
                RspCode::Ack => return Ok(()),
                RspCode::Nack => {
                    nacks += 1;
                    if nacks >= MAX_NACK_RETRIES {
                        bail!("device NACKed the frame {MAX_NACK_RETRIES} times");
                    }
                    eprintln!("device NACK, retransmitting ({nacks}/{MAX_NACK_RETRIES})");
                    self.write_frame(frame)?;
                }
            }
        }
    }

    /// Send without waiting for a response. Used for END: the device has
    /// already persisted its config and may move on before the ACK is
    /// readable on this side.
    pub fn send_frame_skip_ack(&mut self, frame: &Frame) -> Result<()> {
        self.write_frame(frame)
    }

    /// Write a frame one byte at a time with a short pause between bytes,
    /// pacing for the device's single-byte UART receive path.
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let n = frame
            .encode_into(&mut buf)
            .context("frame exceeds the wire buffer")?;

        for byte in &buf[..n] {
            self.port
                .write_all(std::slice::from_ref(byte))
                .context("serial write failed")?;
            if !self.inter_byte_delay.is_zero() {
                thread::sleep(self.inter_byte_delay);
            }
        }
        self.port.flush().context("serial flush failed")?;
        Ok(())
    }

    fn read_response(&mut self, timeout_ms: u64) -> Result<RspCode> {
        self.port
            .set_timeout(Duration::from_millis(timeout_ms))
            .context("failed to set serial timeout")?;

        let mut raw = [0u8; RSP_FRAME_SIZE];
        self.port
            .read_exact(&mut raw)
            .context("no response from the device")?;

        decode_response(&raw).map_err(|_| anyhow::anyhow!("invalid response frame {raw:02x?}"))
    }
}
