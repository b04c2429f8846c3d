// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! HSI (high-speed internal) oscillator driver.
//!
//! The HSI is the only oscillator wired on this board. It feeds the PLL and
//! serves as the boot system clock; it is never disabled within this
//! crate's scope.

use crate::error::ErrorCode;
use crate::rcc::Rcc;
use crate::regfile::RegisterFile;

/// HSI frequency in Hz
pub const HSI_FREQUENCY_HZ: u32 = 16_000_000;

pub struct Hsi<'a, RF: RegisterFile> {
    rcc: &'a Rcc<'a, RF>,
}

impl<'a, RF: RegisterFile> Hsi<'a, RF> {
    pub(in crate::clocks) fn new(rcc: &'a Rcc<'a, RF>) -> Self {
        Self { rcc }
    }

    /// Start the oscillator with its default trim and wait for it to
    /// stabilize.
    pub fn enable(&self) -> Result<(), ErrorCode> {
        self.rcc.enable_hsi_clock();
        self.rcc
            .regfile()
            .wait_until(|_| self.rcc.is_ready_hsi_clock())
    }

    pub fn is_enabled(&self) -> bool {
        self.rcc.is_enabled_hsi_clock()
    }

    /// Whether the oscillator output is stable.
    pub fn is_ready(&self) -> bool {
        self.rcc.is_ready_hsi_clock()
    }

    /// The oscillator frequency, or [None] while it is disabled.
    pub fn frequency_hz(&self) -> Option<u32> {
        if self.is_enabled() {
            Some(HSI_FREQUENCY_HZ)
        } else {
            None
        }
    }
}
