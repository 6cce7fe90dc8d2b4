// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Register-level driver for the STM32H7 dual-bank flash controller.
//!
//! Each bank has its own KEYR/CR/SR/CCR register set (bank 2 at +0x100).
//! Every operation runs the same bracket: unlock, clear stale flags, wait
//! not-busy, operate, wait, check error flags, lock. The lock is restored
//! on every error path.
//!
//! Programming granularity is one 256-bit flash word (32 bytes), written as
//! eight consecutive 32-bit stores; the controller assembles and commits
//! the word when the last store lands. Programming a location that was not
//! erased first trips the inconsistency error flags.

use ember_common::crc::CRC32;
use ember_common::protocol::{FLASH_SECTOR_SIZE, FLASH_SECTORS_PER_BANK, FLASH_WORD_SIZE};

use crate::ticks::Deadline;

const FLASH_REGS_BASE: u32 = 0x5200_2000;
const BANK2_REGS_OFFSET: u32 = 0x100;

const KEYR_OFFSET: u32 = 0x04;
const CR_OFFSET: u32 = 0x0C;
const SR_OFFSET: u32 = 0x10;
const CCR_OFFSET: u32 = 0x14;

const FLASH_KEY1: u32 = 0x4567_0123;
const FLASH_KEY2: u32 = 0xCDEF_89AB;

// CR bits
const CR_LOCK: u32 = 1 << 0;
const CR_PG: u32 = 1 << 1;
const CR_SER: u32 = 1 << 2;
const CR_PSIZE_X64: u32 = 0b11 << 4;
const CR_START: u32 = 1 << 7;
const CR_SNB_SHIFT: u32 = 8;

// SR bits
const SR_BSY: u32 = 1 << 0;
const SR_QW: u32 = 1 << 2;
const SR_WRPERR: u32 = 1 << 17;
const SR_PGSERR: u32 = 1 << 18;
const SR_STRBERR: u32 = 1 << 19;
const SR_INCERR: u32 = 1 << 21;
const SR_OPERR: u32 = 1 << 22;
const SR_SNECCERR: u32 = 1 << 25;
const SR_DBECCERR: u32 = 1 << 26;

const SR_OPERATION_ERR: u32 = SR_PGSERR | SR_STRBERR | SR_INCERR | SR_OPERR;
const SR_ECC_ERR: u32 = SR_SNECCERR | SR_DBECCERR;

/// CCR write-1-to-clear mask for EOP and all error flags.
const CCR_CLEAR_ALL: u32 = 0x0FEF_0000;

/// A sector erase of 128 KiB takes on the order of seconds.
const ERASE_TIMEOUT_MS: u32 = 10_000;
const PROGRAM_TIMEOUT_MS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bank {
    Bank1,
    Bank2,
}

impl Bank {
    pub fn base_addr(self) -> u32 {
        match self {
            Bank::Bank1 => 0x0800_0000,
            Bank::Bank2 => 0x0810_0000,
        }
    }

    pub fn contains(self, addr: u32, len: u32) -> bool {
        let size = FLASH_SECTORS_PER_BANK * FLASH_SECTOR_SIZE;
        addr >= self.base_addr()
            && addr - self.base_addr() < size
            && addr - self.base_addr() + len <= size
    }

    pub fn for_addr(addr: u32) -> Option<Self> {
        [Bank::Bank1, Bank::Bank2]
            .into_iter()
            .find(|bank| bank.contains(addr, 1))
    }

    fn regs(self) -> u32 {
        match self {
            Bank::Bank1 => FLASH_REGS_BASE,
            Bank::Bank2 => FLASH_REGS_BASE + BANK2_REGS_OFFSET,
        }
    }

    fn read(self, offset: u32) -> u32 {
        unsafe { ((self.regs() + offset) as *const u32).read_volatile() }
    }

    fn write(self, offset: u32, value: u32) {
        unsafe { ((self.regs() + offset) as *mut u32).write_volatile(value) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashError {
    /// The controller refused to unlock.
    Locked,
    /// Busy flags never cleared within the deadline.
    Busy,
    /// Address or length not aligned to the 32-byte flash word.
    Alignment,
    /// Sector range or address range outside the bank.
    OutOfRange,
    WriteProtect,
    /// ECC fault reported while the operation completed.
    Ecc,
    /// PGSERR/STRBERR/INCERR/OPERR; includes programming un-erased flash.
    Operation,
}

/// Owner of the flash controller. Holding the only instance `&mut` is what
/// serializes erase/program against each other.
pub struct FlashStore {
    _priv: (),
}

impl FlashStore {
    pub fn new() -> Self {
        Self { _priv: () }
    }

    /// Erase `n_sectors` sectors starting at `first_sector` of `bank`.
    pub fn erase(&mut self, bank: Bank, first_sector: u32, n_sectors: u32) -> Result<(), FlashError> {
        if n_sectors == 0 || first_sector + n_sectors > FLASH_SECTORS_PER_BANK {
            return Err(FlashError::OutOfRange);
        }

        unlock(bank)?;
        let result = erase_locked(bank, first_sector, n_sectors);
        lock(bank);
        result
    }

    /// Program `data` at absolute address `address`. Both must be aligned
    /// to the 32-byte flash word; the target must be erased.
    pub fn program(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        if data.is_empty()
            || address % FLASH_WORD_SIZE != 0
            || data.len() % FLASH_WORD_SIZE as usize != 0
        {
            return Err(FlashError::Alignment);
        }
        let bank = Bank::for_addr(address).ok_or(FlashError::OutOfRange)?;
        if !bank.contains(address, data.len() as u32) {
            return Err(FlashError::OutOfRange);
        }

        unlock(bank)?;
        let result = program_locked(bank, address, data);
        lock(bank);
        result
    }

    /// Read bytes from memory-mapped flash via volatile loads.
    pub fn read(abs_addr: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { ((abs_addr + i as u32) as *const u8).read_volatile() };
        }
    }

    /// CRC-32 (ISO HDLC) over `size` bytes of memory-mapped flash.
    pub fn crc32_region(abs_addr: u32, size: u32) -> u32 {
        let mut digest = CRC32.digest();
        let mut remaining = size as usize;
        let mut addr = abs_addr;
        let mut chunk = [0u8; 256];

        while remaining > 0 {
            let n = remaining.min(chunk.len());
            Self::read(addr, &mut chunk[..n]);
            digest.update(&chunk[..n]);
            addr += n as u32;
            remaining -= n;
        }

        digest.finalize()
    }
}

fn unlock(bank: Bank) -> Result<(), FlashError> {
    if bank.read(CR_OFFSET) & CR_LOCK != 0 {
        bank.write(KEYR_OFFSET, FLASH_KEY1);
        bank.write(KEYR_OFFSET, FLASH_KEY2);
    }
    if bank.read(CR_OFFSET) & CR_LOCK != 0 {
        return Err(FlashError::Locked);
    }
    Ok(())
}

fn lock(bank: Bank) {
    bank.write(CR_OFFSET, bank.read(CR_OFFSET) | CR_LOCK);
}

fn wait_not_busy(bank: Bank, timeout_ms: u32) -> Result<(), FlashError> {
    let deadline = Deadline::after_ms(timeout_ms);
    while bank.read(SR_OFFSET) & (SR_BSY | SR_QW) != 0 {
        if deadline.expired() {
            return Err(FlashError::Busy);
        }
        core::hint::spin_loop();
    }
    Ok(())
}

fn check_flags(bank: Bank) -> Result<(), FlashError> {
    let sr = bank.read(SR_OFFSET);
    if sr & SR_WRPERR != 0 {
        return Err(FlashError::WriteProtect);
    }
    if sr & SR_ECC_ERR != 0 {
        return Err(FlashError::Ecc);
    }
    if sr & SR_OPERATION_ERR != 0 {
        return Err(FlashError::Operation);
    }
    Ok(())
}

fn erase_locked(bank: Bank, first_sector: u32, n_sectors: u32) -> Result<(), FlashError> {
    for sector in first_sector..first_sector + n_sectors {
        bank.write(CCR_OFFSET, CCR_CLEAR_ALL);
        wait_not_busy(bank, ERASE_TIMEOUT_MS)?;

        bank.write(
            CR_OFFSET,
            CR_SER | CR_PSIZE_X64 | (sector << CR_SNB_SHIFT),
        );
        bank.write(
            CR_OFFSET,
            CR_SER | CR_PSIZE_X64 | (sector << CR_SNB_SHIFT) | CR_START,
        );

        wait_not_busy(bank, ERASE_TIMEOUT_MS)?;
        check_flags(bank)?;
    }
    bank.write(CR_OFFSET, 0);
    Ok(())
}

fn program_locked(bank: Bank, address: u32, data: &[u8]) -> Result<(), FlashError> {
    bank.write(CCR_OFFSET, CCR_CLEAR_ALL);
    wait_not_busy(bank, PROGRAM_TIMEOUT_MS)?;

    let mut addr = address;
    for word in data.chunks_exact(FLASH_WORD_SIZE as usize) {
        bank.write(CR_OFFSET, CR_PG | CR_PSIZE_X64);

        for (i, quad) in word.chunks_exact(4).enumerate() {
            let value = u32::from_le_bytes(quad.try_into().unwrap());
            unsafe {
                ((addr + 4 * i as u32) as *mut u32).write_volatile(value);
            }
        }
        cortex_m::asm::dsb();

        wait_not_busy(bank, PROGRAM_TIMEOUT_MS)?;
        check_flags(bank)?;
        addr += FLASH_WORD_SIZE;
    }

    bank.write(CR_OFFSET, 0);
    Ok(())
}
