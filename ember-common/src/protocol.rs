// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire protocol for the bootloader <-> flasher download link.
//!
//! Frame layout (LEN big-endian, CRC little-endian):
//!
//! ```text
//! +------+------+----------+-----------------+---------+------+
//! | SOF  | TYPE | LEN (2B) | PAYLOAD (LEN B) | CRC(4B) | EOF  |
//! +------+------+----------+-----------------+---------+------+
//!  0xAA                                                  0xBB
//! ```
//!
//! The CRC covers the 4 header bytes plus the payload. Responses are a
//! fixed 4-byte frame with no CRC: `SOF | TYPE=RESPONSE | ACK/NACK | EOF`.

use heapless::Vec;

use crate::crc::crc32;

// --- Flash layout constants (STM32H743: 2 banks x 8 sectors x 128 KiB) ---

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const BOOTLOADER_ADDR: u32 = FLASH_BASE;
pub const BOOTLOADER_MAX_SIZE: u32 = 256 * 1024;
pub const CONFIG_ADDR: u32 = 0x0804_0000;
pub const APP_ADDR: u32 = 0x0810_0000;
pub const APP_MAX_SIZE: u32 = 1024 * 1024;

pub const FLASH_SECTOR_SIZE: u32 = 128 * 1024;
pub const FLASH_SECTORS_PER_BANK: u32 = 8;
/// Minimum programming unit: one 256-bit flash word.
pub const FLASH_WORD_SIZE: u32 = 32;

/// Bank-1 sector holding the config block.
pub const CONFIG_SECTOR: u32 = (CONFIG_ADDR - FLASH_BASE) / FLASH_SECTOR_SIZE;
/// Sectors of bank 2 covering the application slot.
pub const APP_SECTOR_COUNT: u32 = APP_MAX_SIZE / FLASH_SECTOR_SIZE;

// --- Link constants ---

pub const DOWNLOAD_BAUD_RATE: u32 = 921_600;
/// Per-byte receive deadline outside the IDLE state.
pub const BYTE_TIMEOUT_MS: u32 = 10_000;

// --- Frame constants ---

pub const FRAME_SOF: u8 = 0xAA;
pub const FRAME_EOF: u8 = 0xBB;

/// Maximum payload bytes per frame (one image fragment).
pub const MAX_DATA_SIZE: usize = 1024;
/// SOF + TYPE + LEN + CRC + EOF.
pub const FRAME_OVERHEAD: usize = 9;
pub const MAX_FRAME_SIZE: usize = MAX_DATA_SIZE + FRAME_OVERHEAD;
pub const RSP_FRAME_SIZE: usize = 4;

const _: () = assert!(MAX_FRAME_SIZE == 1033);

// --- Wire enums ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Cmd = 0x01,
    Header = 0x02,
    Data = 0x03,
    Response = 0x04,
}

impl FrameType {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Cmd),
            0x02 => Some(Self::Header),
            0x03 => Some(Self::Data),
            0x04 => Some(Self::Response),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Start = 0x01,
    /// Reserved in the type space; the device NACKs it.
    Abort = 0x02,
    End = 0x03,
}

impl Command {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Start),
            0x02 => Some(Self::Abort),
            0x03 => Some(Self::End),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RspCode {
    Ack = 0x01,
    Nack = 0x02,
}

// --- Errors ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    BadSof(u8),
    BadEof(u8),
    BadType(u8),
    /// LEN field exceeds [`MAX_DATA_SIZE`].
    Oversize(u16),
    /// Byte count does not match the LEN field.
    Truncated,
    CrcMismatch { expected: u32, computed: u32 },
    /// Response frame failed the SOF/TYPE/CODE/EOF constraints.
    BadResponse,
}

// --- Frame ---

/// A decoded (or to-be-encoded) download frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8, MAX_DATA_SIZE>,
}

impl Frame {
    pub fn command(cmd: Command) -> Self {
        let mut payload = Vec::new();
        let _ = payload.push(cmd as u8);
        Self {
            frame_type: FrameType::Cmd,
            payload,
        }
    }

    /// HEADER frame: image size then expected image CRC, both big-endian.
    pub fn header(image_size: u32, image_crc: u32) -> Self {
        let mut payload = Vec::new();
        let _ = payload.extend_from_slice(&image_size.to_be_bytes());
        let _ = payload.extend_from_slice(&image_crc.to_be_bytes());
        Self {
            frame_type: FrameType::Header,
            payload,
        }
    }

    /// DATA frame carrying one image fragment. `None` if the chunk does not
    /// fit in a single frame.
    pub fn data(chunk: &[u8]) -> Option<Self> {
        let payload = Vec::from_slice(chunk).ok()?;
        Some(Self {
            frame_type: FrameType::Data,
            payload,
        })
    }

    /// The command byte of a well-formed CMD frame.
    pub fn command_byte(&self) -> Option<Command> {
        if self.frame_type != FrameType::Cmd || self.payload.len() != 1 {
            return None;
        }
        Command::from_wire(self.payload[0])
    }

    /// `(image_size, image_crc)` of a well-formed HEADER frame.
    pub fn header_fields(&self) -> Option<(u32, u32)> {
        if self.frame_type != FrameType::Header || self.payload.len() != 8 {
            return None;
        }
        let size = u32::from_be_bytes(self.payload[0..4].try_into().ok()?);
        let crc = u32::from_be_bytes(self.payload[4..8].try_into().ok()?);
        Some((size, crc))
    }

    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Serialize into `out`, returning the byte count. `None` if `out` is
    /// too small.
    pub fn encode_into(&self, out: &mut [u8]) -> Option<usize> {
        let total = self.encoded_len();
        if out.len() < total {
            return None;
        }
        let len = self.payload.len() as u16;

        out[0] = FRAME_SOF;
        out[1] = self.frame_type as u8;
        out[2..4].copy_from_slice(&len.to_be_bytes());
        out[4..4 + self.payload.len()].copy_from_slice(&self.payload);

        let crc = crc32(&out[..4 + self.payload.len()]);
        out[4 + self.payload.len()..8 + self.payload.len()].copy_from_slice(&crc.to_le_bytes());
        out[total - 1] = FRAME_EOF;

        Some(total)
    }
}

/// Decode a complete frame. `raw` must contain exactly the bytes of one
/// frame; checks run in wire order (SOF, LEN bound, EOF, CRC, TYPE).
pub fn decode_frame(raw: &[u8]) -> Result<Frame, FrameError> {
    if raw.len() < FRAME_OVERHEAD {
        return Err(FrameError::Truncated);
    }
    if raw[0] != FRAME_SOF {
        return Err(FrameError::BadSof(raw[0]));
    }
    let len = u16::from_be_bytes([raw[2], raw[3]]);
    if len as usize > MAX_DATA_SIZE {
        return Err(FrameError::Oversize(len));
    }
    if raw.len() != len as usize + FRAME_OVERHEAD {
        return Err(FrameError::Truncated);
    }

    let crc_at = 4 + len as usize;
    let eof = raw[crc_at + 4];
    if eof != FRAME_EOF {
        return Err(FrameError::BadEof(eof));
    }

    let expected = u32::from_le_bytes(raw[crc_at..crc_at + 4].try_into().unwrap());
    let computed = crc32(&raw[..crc_at]);
    if expected != computed {
        return Err(FrameError::CrcMismatch { expected, computed });
    }

    let frame_type = FrameType::from_wire(raw[1]).ok_or(FrameError::BadType(raw[1]))?;
    let payload = Vec::from_slice(&raw[4..crc_at]).map_err(|_| FrameError::Oversize(len))?;

    Ok(Frame {
        frame_type,
        payload,
    })
}

/// Encode the fixed 4-byte response frame.
pub fn encode_response(code: RspCode) -> [u8; RSP_FRAME_SIZE] {
    [FRAME_SOF, FrameType::Response as u8, code as u8, FRAME_EOF]
}

/// Decode a response frame. Every byte is constrained, which is what stands
/// in for a CRC on this short frame.
pub fn decode_response(raw: &[u8; RSP_FRAME_SIZE]) -> Result<RspCode, FrameError> {
    if raw[0] != FRAME_SOF || raw[1] != FrameType::Response as u8 || raw[3] != FRAME_EOF {
        return Err(FrameError::BadResponse);
    }
    match raw[2] {
        0x01 => Ok(RspCode::Ack),
        0x02 => Ok(RspCode::Nack),
        _ => Err(FrameError::BadResponse),
    }
}

/// Fragments needed for an image: 1024-byte chunks, last one short.
pub const fn total_fragments(image_size: u32) -> u32 {
    image_size.div_ceil(MAX_DATA_SIZE as u32)
}
