// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot orchestration: reboot-reason arbitration, the button window, image
//! verification, diagnostic LED patterns, and the control handoff.

use cortex_m::asm;
use ember_common::boot::{
    check_image, mandatory_download, plausible_vector_word, DownloadTrigger, ImageCheck,
    BUTTON_POLL_MS, BUTTON_WINDOW_MS,
};
use ember_common::config::{BootConfig, RebootReason};
use ember_common::protocol::APP_ADDR;

use crate::config;
use crate::download;
use crate::flash::FlashStore;
use crate::peripherals::Peripherals;
use crate::ticks::{self, Deadline};

// Diagnostic blink half-periods, one failure class per LED.
const NO_IMAGE_BLINK_MS: u32 = 500;
const CRC_FAIL_BLINK_MS: u32 = 1_250; // 2.5 s period
const BAD_VECTOR_BLINK_MS: u32 = 250;

#[derive(Clone, Copy)]
enum Fault {
    NoImage,
    CrcFail,
    BadVector,
}

pub fn run(p: &mut Peripherals, flash: &mut FlashStore) -> ! {
    let mut cfg = config::load(flash);
    log_reason(&cfg);

    let trigger = mandatory_download(cfg.reason()).or_else(|| {
        button_pressed_within_window(p).then_some(DownloadTrigger::Button)
    });

    if let Some(trigger) = trigger {
        log_trigger(trigger);
        p.led1.set_high();
        let result = download::run(&mut p.link, flash, &mut cfg);
        p.led1.set_low();
        if result.is_err() {
            // No jump off the back of a failed download; the image must
            // re-verify below before it is trusted again.
            cfg.mark_bootable(false);
        }
    }

    match check_image(&cfg, |size| FlashStore::crc32_region(APP_ADDR, size)) {
        ImageCheck::Bootable => {
            defmt::info!("image crc verified, loading application");
            cfg.mark_bootable(true);
            if config::save(flash, &mut cfg).is_err() {
                defmt::error!("failed to persist bootable flag");
            }
            unsafe { jump_to_application(APP_ADDR) };
            // Only reachable when the vector table failed the sanity check.
            defmt::error!("application vector table implausible, refusing to jump");
            fault_loop(p, Fault::BadVector)
        }
        ImageCheck::NoImage => {
            defmt::warn!("no application image, staying in bootloader");
            fault_loop(p, Fault::NoImage)
        }
        ImageCheck::NoStoredCrc => {
            defmt::error!("stored image crc is an erased-flash value");
            demote(flash, &mut cfg);
            fault_loop(p, Fault::CrcFail)
        }
        ImageCheck::CrcMismatch { expected, computed } => {
            defmt::error!(
                "image crc mismatch: expected {=u32:#x}, computed {=u32:#x}",
                expected,
                computed
            );
            demote(flash, &mut cfg);
            fault_loop(p, Fault::CrcFail)
        }
    }
}

/// Mark the image not bootable and persist the verdict.
fn demote(flash: &mut FlashStore, cfg: &mut BootConfig) {
    cfg.mark_bootable(false);
    if config::save(flash, cfg).is_err() {
        defmt::error!("failed to persist not-bootable flag");
    }
}

fn log_reason(cfg: &BootConfig) {
    match cfg.reason() {
        Some(RebootReason::FirstTimeBoot) => defmt::info!("first time boot detected"),
        Some(RebootReason::NormalBoot) => defmt::info!("normal boot"),
        Some(RebootReason::DlRequest) => defmt::info!("application requested a download"),
        Some(RebootReason::AppFailed) => defmt::warn!("previous application run failed"),
        None => defmt::warn!(
            "unrecognized reboot reason {=u32:#x}",
            cfg.reboot_reason
        ),
    }
}

fn log_trigger(trigger: DownloadTrigger) {
    match trigger {
        DownloadTrigger::FirstBoot => defmt::info!("entering download mode: fresh device"),
        DownloadTrigger::Requested => {
            defmt::info!("entering download mode: requested by the application")
        }
        DownloadTrigger::AppFailed => {
            defmt::info!("entering download mode: application marked failed")
        }
        DownloadTrigger::UnknownReason => {
            defmt::info!("entering download mode: reboot reason not understood")
        }
        DownloadTrigger::Button => defmt::info!("entering download mode: user button"),
    }
}

/// Poll the user button once per millisecond for the whole window.
fn button_pressed_within_window(p: &mut Peripherals) -> bool {
    defmt::info!(
        "press the user button within {=u32} ms to force download mode",
        BUTTON_WINDOW_MS
    );
    let deadline = Deadline::after_ms(BUTTON_WINDOW_MS);
    while !deadline.expired() {
        if p.button.is_high() {
            return true;
        }
        ticks::delay_ms(BUTTON_POLL_MS);
    }
    false
}

fn fault_loop(p: &mut Peripherals, fault: Fault) -> ! {
    loop {
        match fault {
            Fault::NoImage => {
                p.led2.toggle();
                ticks::delay_ms(NO_IMAGE_BLINK_MS);
            }
            Fault::CrcFail => {
                p.led3.toggle();
                ticks::delay_ms(CRC_FAIL_BLINK_MS);
            }
            Fault::BadVector => {
                p.led1.toggle();
                ticks::delay_ms(BAD_VECTOR_BLINK_MS);
            }
        }
    }
}

// --- Control handoff ---

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    unsafe fn read_from(addr: u32) -> Self {
        Self {
            initial_sp: (addr as *const u32).read_volatile(),
            reset_vector: (addr as *const u32).offset(1).read_volatile(),
        }
    }
}

/// RAM regions an application initial stack pointer can plausibly point
/// into (one past the end is a valid full-descending stack top).
fn plausible_stack_pointer(sp: u32) -> bool {
    const REGIONS: [(u32, u32); 4] = [
        (0x2000_0000, 0x2002_0000), // DTCM
        (0x2400_0000, 0x2408_0000), // AXI SRAM
        (0x3000_0000, 0x3004_8000), // SRAM1-3
        (0x3800_0000, 0x3801_0000), // SRAM4
    ];
    REGIONS
        .iter()
        .any(|&(start, end)| sp > start && sp <= end)
}

/// De-initialize the bootloader's footprint and branch into the
/// application. Returns only if the vector table fails the sanity check.
///
/// # Safety
/// `app_base` must point at a CRC-verified application image.
pub unsafe fn jump_to_application(app_base: u32) {
    let vt = VectorTable::read_from(app_base);
    if !plausible_vector_word(vt.reset_vector) || !plausible_stack_pointer(vt.initial_sp) {
        return;
    }

    // Let the last log lines drain before the timebase goes away.
    ticks::delay_ms(100);

    release_peripherals();

    cortex_m::interrupt::disable();

    // SysTick off and cleared
    const SYST_CSR: *mut u32 = 0xE000_E010 as *mut u32;
    const SYST_RVR: *mut u32 = 0xE000_E014 as *mut u32;
    const SYST_CVR: *mut u32 = 0xE000_E018 as *mut u32;
    SYST_CSR.write_volatile(0);
    SYST_RVR.write_volatile(0);
    SYST_CVR.write_volatile(0);

    // Mask and clear every interrupt line (8 NVIC words on this core)
    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    for i in 0..8 {
        NVIC_ICER.add(i).write_volatile(0xFFFF_FFFF);
        NVIC_ICPR.add(i).write_volatile(0xFFFF_FFFF);
    }

    // NOTE: the clock tree is left configured - the application's own
    // startup switches away from the PLL before reconfiguring it.

    // Vector table over to the application
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(app_base);

    asm::dsb();
    asm::isb();

    jump(vt.initial_sp, vt.reset_vector)
}

/// Put every peripheral the bootloader touched back into its reset state:
/// the download UART and the button/LED GPIO ports, via RCC reset pulses.
unsafe fn release_peripherals() {
    const RCC_BASE: u32 = 0x5802_4400;
    const RCC_AHB4RSTR: *mut u32 = (RCC_BASE + 0x088) as *mut u32;
    const RCC_APB1LRSTR: *mut u32 = (RCC_BASE + 0x090) as *mut u32;

    const AHB4_GPIOA: u32 = 1 << 0;
    const AHB4_GPIOB: u32 = 1 << 1;
    const AHB4_GPIOC: u32 = 1 << 2;
    const AHB4_GPIOE: u32 = 1 << 4;
    const APB1L_USART2: u32 = 1 << 17;

    RCC_APB1LRSTR.write_volatile(APB1L_USART2);
    RCC_APB1LRSTR.write_volatile(0);

    RCC_AHB4RSTR.write_volatile(AHB4_GPIOA | AHB4_GPIOB | AHB4_GPIOC | AHB4_GPIOE);
    RCC_AHB4RSTR.write_volatile(0);

    asm::dsb();
}

unsafe fn jump(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i",  // application starts with PRIMASK clear
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
