// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Ember bootloader for STM32H743: validates, receives, and activates
//! application images over a framed UART protocol.

#![no_std]
#![no_main]

mod boot;
mod config;
mod download;
mod flash;
mod peripherals;
mod serial;
mod ticks;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u32:ms}", crate::ticks::now_ms());

use cortex_m_rt::entry;

#[entry]
fn main() -> ! {
    defmt::info!("ember bootloader v{=str}", env!("CARGO_PKG_VERSION"));

    let mut p = peripherals::init();
    let mut flash = flash::FlashStore::new();

    boot::run(&mut p, &mut flash)
}
