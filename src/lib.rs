// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Clock tree, voltage scaling and flash latency bring-up for the
//! STM32F401RE.
//!
//! The bring-up sequence calls [clocks::Clocks::setup_system_clock] exactly
//! once to raise the system clock from the 16 MHz boot oscillator to the
//! PLL. Afterwards, peripherals gate their bus clocks on through the same
//! struct and derive timing values (baud divisors, timer reloads) from
//! [clocks::Clocks::get_frequency], which always answers from the live
//! register contents.
//!
//! Register access is injected through [regfile::RegisterFile]. A board
//! binds the drivers to [regfile::Mmio]:
//!
//! ```rust,ignore
//! static REGS: Mmio = unsafe { Mmio::new() };
//! let rcc = Rcc::new(&REGS);
//! let pwr = Pwr::new(&REGS);
//! let flash = Flash::new(&REGS);
//! let clocks = Clocks::new(&rcc, &pwr, &flash);
//!
//! clocks.setup_system_clock(&SYS_CLOCK_84MHZ)?;
//! clocks.enable_gpio_bank(GpioBank::GPIOA)?;
//! clocks.enable_usart(Usart::USART2)?;
//! let baud_base = clocks.get_frequency(ClockDomain::Apb1Peripheral);
//! ```
//!
//! Unit tests bind the same drivers to an in-memory register file instead.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clocks;
pub mod error;
pub mod flash;
pub mod pwr;
pub mod rcc;
pub mod regfile;

pub use error::ErrorCode;
