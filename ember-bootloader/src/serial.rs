// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Byte-oriented wrapper over the download UART.
//!
//! The protocol is synchronous request/response, so reads are blocking with
//! an optional millisecond deadline and writes block until drained.

use embedded_hal::serial::{Read, Write};
use stm32h7xx_hal::pac::USART2;
use stm32h7xx_hal::serial::{Rx, Tx};

use crate::ticks::Deadline;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxError {
    /// No byte arrived within the deadline.
    Timeout,
    /// Framing/noise/overrun reported by the UART.
    Line,
}

pub struct DownloadLink {
    rx: Rx<USART2>,
    tx: Tx<USART2>,
}

impl DownloadLink {
    pub fn new(tx: Tx<USART2>, rx: Rx<USART2>) -> Self {
        Self { rx, tx }
    }

    /// Read one byte. `timeout_ms == None` waits forever (the IDLE state
    /// waits indefinitely for the first byte of a download).
    pub fn read_byte(&mut self, timeout_ms: Option<u32>) -> Result<u8, RxError> {
        let deadline = timeout_ms.map(Deadline::after_ms);
        loop {
            match self.rx.read() {
                Ok(byte) => return Ok(byte),
                Err(nb::Error::WouldBlock) => {
                    if let Some(deadline) = deadline {
                        if deadline.expired() {
                            return Err(RxError::Timeout);
                        }
                    }
                }
                Err(nb::Error::Other(_)) => return Err(RxError::Line),
            }
        }
    }

    /// Read exactly `buf.len()` bytes, each under its own deadline.
    pub fn read_exact(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), RxError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte(Some(timeout_ms))?;
        }
        Ok(())
    }

    pub fn write_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let _ = nb::block!(self.tx.write(byte));
        }
        let _ = nb::block!(self.tx.flush());
    }
}
