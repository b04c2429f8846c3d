// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Voltage regulator scaling for the STM32F401RE.
//!
//! The regulator output level bounds the highest system clock frequency the
//! core may run at, so the bring-up sequence raises it before switching to
//! the PLL. The power interface clock (PWREN) must be gated on before any
//! access to the power control register.

use tock_registers::fields::FieldValue;
use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::error::ErrorCode;
use crate::regfile::{Register, RegisterFile};

register_bitfields![u32,
    CR [
        /// Regulator voltage scaling output selection
        VOS OFFSET(14) NUMBITS(2) [
            Scale3 = 0b01,
            Scale2 = 0b10,
        ],
        /// Flash power-down in stop mode
        FPDS OFFSET(9) NUMBITS(1) [],
        /// Disable backup domain write protection
        DBP OFFSET(8) NUMBITS(1) [],
        /// PVD level selection
        PLS OFFSET(5) NUMBITS(3) [],
        /// Power voltage detector enable
        PVDE OFFSET(4) NUMBITS(1) [],
        /// Clear standby flag
        CSBF OFFSET(3) NUMBITS(1) [],
        /// Clear wakeup flag
        CWUF OFFSET(2) NUMBITS(1) [],
        /// Power-down deepsleep
        PDDS OFFSET(1) NUMBITS(1) [],
        /// Low-power deepsleep
        LPDS OFFSET(0) NUMBITS(1) []
    ]
];

/// Regulator output levels supported by this part.
///
/// Each level carries the highest system clock frequency it can sustain.
/// The two variants are the only legal field encodings, so an out-of-range
/// scaling request is unrepresentable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageScale {
    /// Up to 84 MHz
    Scale2 = 0b10,
    /// Up to 60 MHz, lower power draw
    Scale3 = 0b01,
}

impl VoltageScale {
    pub const fn max_sys_clock_hz(self) -> u32 {
        match self {
            VoltageScale::Scale2 => 84_000_000,
            VoltageScale::Scale3 => 60_000_000,
        }
    }
}

pub struct Pwr<'a, RF: RegisterFile> {
    regs: &'a RF,
}

impl<'a, RF: RegisterFile> Pwr<'a, RF> {
    pub const fn new(regs: &'a RF) -> Self {
        Self { regs }
    }

    fn cr(&self) -> LocalRegisterCopy<u32, CR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::PwrCr))
    }

    fn modify_cr(&self, fields: FieldValue<u32, CR::Register>) {
        let value = self.regs.read(Register::PwrCr);
        self.regs.write(Register::PwrCr, fields.modify(value));
    }

    /// Select the regulator output level and wait for the field to take.
    pub fn set_scaling(&self, scale: VoltageScale) -> Result<(), ErrorCode> {
        self.modify_cr(CR::VOS.val(scale as u32));
        self.regs
            .wait_until(|_| self.cr().read(CR::VOS) == scale as u32)?;
        debug!("regulator scaling set, ceiling {} Hz", scale.max_sys_clock_hz());
        Ok(())
    }

    pub fn get_scaling(&self) -> Option<VoltageScale> {
        match self.cr().read(CR::VOS) {
            0b10 => Some(VoltageScale::Scale2),
            0b01 => Some(VoltageScale::Scale3),
            _ => None,
        }
    }
}
