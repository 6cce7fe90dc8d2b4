// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Config manager: the durable [`BootConfig`] block in bank-1 sector 2.
//!
//! A save is erase-then-program and is not atomic against power loss; a
//! torn save leaves an invalid block, which the next load recovers from by
//! restoring defaults. Defaults read as "fresh device" and route the boot
//! into download mode.

use ember_common::config::{BootConfig, CONFIG_BLOCK_SIZE};
use ember_common::protocol::{CONFIG_ADDR, CONFIG_SECTOR};

use crate::flash::{Bank, FlashError, FlashStore};

// The block is two flash words; no padding needed.
const _: () = assert!(CONFIG_BLOCK_SIZE % 32 == 0);

/// Load the config block. Any mismatch (marker or CRC) yields defaults and
/// a best-effort save of them.
pub fn load(flash: &mut FlashStore) -> BootConfig {
    let mut raw = [0u8; CONFIG_BLOCK_SIZE];
    FlashStore::read(CONFIG_ADDR, &mut raw);

    let cfg = BootConfig::from_bytes(&raw);
    if cfg.is_valid() {
        return cfg;
    }

    defmt::warn!("config block invalid, restoring defaults");
    let mut defaults = BootConfig::default_new();
    if save(flash, &mut defaults).is_err() {
        defmt::error!("failed to persist default config");
    }
    defaults
}

/// Seal and persist the block: erase the config sector, program the block.
pub fn save(flash: &mut FlashStore, cfg: &mut BootConfig) -> Result<(), FlashError> {
    cfg.seal();
    flash.erase(Bank::Bank1, CONFIG_SECTOR, 1)?;
    flash.program(CONFIG_ADDR, cfg.as_bytes())?;
    defmt::debug!("config saved");
    Ok(())
}
