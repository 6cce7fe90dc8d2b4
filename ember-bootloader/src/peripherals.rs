// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Peripheral initialization for the bootloader.
//!
//! Pin map: PC13 user button (high-active), PB0/PE1/PB14 diagnostic LEDs,
//! USART2 on PA2/PA3 as the download link.

use ember_common::protocol::DOWNLOAD_BAUD_RATE;
use stm32h7xx_hal::gpio::{self, Input, Output, PushPull};
use stm32h7xx_hal::{pac, prelude::*};

use crate::serial::DownloadLink;
use crate::ticks;

pub type ButtonPin = gpio::gpioc::PC13<Input>;
pub type Led1Pin = gpio::gpiob::PB0<Output<PushPull>>;
pub type Led2Pin = gpio::gpioe::PE1<Output<PushPull>>;
pub type Led3Pin = gpio::gpiob::PB14<Output<PushPull>>;

pub struct Peripherals {
    pub button: ButtonPin,
    pub led1: Led1Pin,
    pub led2: Led2Pin,
    pub led3: Led3Pin,
    pub link: DownloadLink,
}

pub fn init() -> Peripherals {
    let cp = cortex_m::Peripherals::take().unwrap();
    let dp = pac::Peripherals::take().unwrap();

    let pwr = dp.PWR.constrain();
    let pwrcfg = pwr.freeze();

    let rcc = dp.RCC.constrain();
    let ccdr = rcc.sys_ck(100.MHz()).freeze(pwrcfg, &dp.SYSCFG);

    ticks::init(cp.SYST, ccdr.clocks.c_ck().raw());

    let gpioa = dp.GPIOA.split(ccdr.peripheral.GPIOA);
    let gpiob = dp.GPIOB.split(ccdr.peripheral.GPIOB);
    let gpioc = dp.GPIOC.split(ccdr.peripheral.GPIOC);
    let gpioe = dp.GPIOE.split(ccdr.peripheral.GPIOE);

    let serial = dp
        .USART2
        .serial(
            (gpioa.pa2.into_alternate(), gpioa.pa3.into_alternate()),
            DOWNLOAD_BAUD_RATE.bps(),
            ccdr.peripheral.USART2,
            &ccdr.clocks,
        )
        .unwrap();
    let (tx, rx) = serial.split();

    Peripherals {
        button: gpioc.pc13.into_floating_input(),
        led1: gpiob.pb0.into_push_pull_output(),
        led2: gpioe.pe1.into_push_pull_output(),
        led3: gpiob.pb14.into_push_pull_output(),
        link: DownloadLink::new(tx, rx),
    }
}
