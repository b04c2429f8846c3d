// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Main PLL driver.
//!
//! The PLL multiplies the oscillator up to the target system frequency in
//! three stages: the input divider M feeds the VCO, the VCO multiplies by
//! N, and the output divider P produces the system clock candidate. The Q
//! divider taps the VCO for the 48 MHz peripheral domain and is programmed
//! but otherwise unused here.
//!
//! Frequencies derived from the PLL reproduce the hardware arithmetic
//! exactly: the input division truncates before the multiplication, and
//! the output division truncates last. [Pll::frequency_hz] re-reads the
//! programmed fields on every call instead of caching, so it always
//! reflects what the hardware is actually doing.

use crate::clocks::hsi::HSI_FREQUENCY_HZ;
use crate::error::ErrorCode;
use crate::rcc::{PllSource, Rcc, PLLP};
use crate::regfile::RegisterFile;

/// Field values for the PLL configuration register.
///
/// `m` divides the source into the VCO, `n` multiplies inside the VCO, `p`
/// divides the VCO down to the system clock output and `q` divides it down
/// to the 48 MHz domain. The VCO band itself is not checked here; the
/// shipped configurations keep it inside the datasheet limits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllConfig {
    pub m: u8,
    pub n: u16,
    pub p: PLLP,
    pub q: u8,
    pub source: PllSource,
}

impl PllConfig {
    /// Check every field against its hardware range. Runs before any
    /// register write, so a rejected configuration changes nothing.
    pub fn validate(&self) -> Result<(), ErrorCode> {
        if self.m < 2 || self.m > 63 {
            return Err(ErrorCode::InvalidParameter);
        }
        if self.n < 50 || self.n > 432 {
            return Err(ErrorCode::InvalidParameter);
        }
        if self.q < 2 || self.q > 15 {
            return Err(ErrorCode::InvalidParameter);
        }
        Ok(())
    }

    /// The output frequency this configuration produces from `source_hz`,
    /// with the hardware's truncation order.
    pub fn output_frequency_hz(&self, source_hz: u32) -> u32 {
        let vco = source_hz / self.m as u32 * self.n as u32;
        vco / u32::from(self.p)
    }
}

pub struct Pll<'a, RF: RegisterFile> {
    rcc: &'a Rcc<'a, RF>,
}

impl<'a, RF: RegisterFile> Pll<'a, RF> {
    pub(in crate::clocks) fn new(rcc: &'a Rcc<'a, RF>) -> Self {
        Self { rcc }
    }

    /// Program the PLL dividers and source.
    ///
    /// The PLL must be disabled: the hardware ignores field writes while it
    /// runs, so a reconfiguration attempt on a live PLL is rejected with
    /// [ErrorCode::AlreadyInitialized] rather than silently taking no
    /// effect.
    pub fn configure(&self, config: &PllConfig) -> Result<(), ErrorCode> {
        config.validate()?;
        if self.is_enabled() {
            return Err(ErrorCode::AlreadyInitialized);
        }

        self.rcc.set_pll_source(config.source);
        self.rcc.set_pll_m_divider(config.m);
        self.rcc.set_pll_n_multiplier(config.n);
        self.rcc.set_pll_p_divider(config.p);
        self.rcc.set_pll_q_divider(config.q);
        Ok(())
    }

    /// Turn the PLL on. Callers follow up with [Pll::wait_lock] before
    /// selecting it as the system clock source.
    pub fn enable(&self) {
        self.rcc.enable_pll_clock();
    }

    /// Spin until the PLL reports lock.
    pub fn wait_lock(&self) -> Result<(), ErrorCode> {
        self.rcc
            .regfile()
            .wait_until(|_| self.rcc.is_locked_pll_clock())
    }

    pub fn is_enabled(&self) -> bool {
        self.rcc.is_enabled_pll_clock()
    }

    pub fn is_locked(&self) -> bool {
        self.rcc.is_locked_pll_clock()
    }

    // Output frequency derived from the currently programmed fields, in the
    // same operation order the hardware applies. Returns 0 when the source
    // cannot be resolved: the HSE is not fitted on this board, and an M of
    // zero means the register holds no meaningful configuration.
    pub(crate) fn frequency_hz(&self) -> u32 {
        let source_hz = match self.rcc.get_pll_source() {
            PllSource::HSI => HSI_FREQUENCY_HZ,
            PllSource::HSE => return 0,
        };
        let m = self.rcc.get_pll_m_divider();
        if m == 0 {
            return 0;
        }
        let vco = source_hz / m * self.rcc.get_pll_n_multiplier();
        vco / u32::from(self.rcc.get_pll_p_divider())
    }
}
