// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Millisecond timebase from SysTick.
//!
//! The SysTick exception incrementing [`TICKS`] is the only interrupt the
//! bootloader uses; everything else is polled from the main loop.

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SYST;
use cortex_m_rt::exception;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Start the 1 kHz tick. `core_hz` is the CPU clock feeding SysTick.
pub fn init(mut syst: SYST, core_hz: u32) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(core_hz / 1_000 - 1);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

#[exception]
fn SysTick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

pub fn now_ms() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

pub fn delay_ms(ms: u32) {
    let start = now_ms();
    while now_ms().wrapping_sub(start) < ms {
        core::hint::spin_loop();
    }
}

/// A point in time `timeout_ms` from its creation.
#[derive(Clone, Copy)]
pub struct Deadline {
    start: u32,
    timeout_ms: u32,
}

impl Deadline {
    pub fn after_ms(timeout_ms: u32) -> Self {
        Self {
            start: now_ms(),
            timeout_ms,
        }
    }

    pub fn expired(&self) -> bool {
        now_ms().wrapping_sub(self.start) >= self.timeout_ms
    }
}
