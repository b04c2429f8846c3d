// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Flash access latency, caches and prefetch for the STM32F401RE.
//!
//! Raising the core clock without first raising the wait-state count
//! corrupts flash reads, so the ordering is owned by the caller: latency
//! goes up before the frequency does, and would only come down after a
//! frequency drop (which the bring-up sequence never performs).

use tock_registers::fields::FieldValue;
use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::error::ErrorCode;
use crate::regfile::{Register, RegisterFile};

register_bitfields![u32,
    ACR [
        /// Data cache reset
        DCRST OFFSET(12) NUMBITS(1) [],
        /// Instruction cache reset
        ICRST OFFSET(11) NUMBITS(1) [],
        /// Data cache enable
        DCEN OFFSET(10) NUMBITS(1) [],
        /// Instruction cache enable
        ICEN OFFSET(9) NUMBITS(1) [],
        /// Prefetch enable
        PRFTEN OFFSET(8) NUMBITS(1) [],
        /// Latency
        LATENCY OFFSET(0) NUMBITS(4) []
    ]
];

/// Highest wait-state count the latency field can hold.
pub const MAX_WAIT_STATES: u32 = 15;

pub struct Flash<'a, RF: RegisterFile> {
    regs: &'a RF,
}

impl<'a, RF: RegisterFile> Flash<'a, RF> {
    pub const fn new(regs: &'a RF) -> Self {
        Self { regs }
    }

    fn acr(&self) -> LocalRegisterCopy<u32, ACR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::FlashAcr))
    }

    fn modify_acr(&self, fields: FieldValue<u32, ACR::Register>) {
        let value = self.regs.read(Register::FlashAcr);
        self.regs.write(Register::FlashAcr, fields.modify(value));
    }

    /// Program the wait-state count and confirm the readback, then fence so
    /// no instruction fetch runs ahead of the new latency.
    pub fn set_latency(&self, wait_states: u32) -> Result<(), ErrorCode> {
        if wait_states > MAX_WAIT_STATES {
            error!("flash latency out of range: {}", wait_states);
            return Err(ErrorCode::InvalidParameter);
        }

        self.modify_acr(ACR::LATENCY.val(wait_states));
        self.regs.wait_until(|_| self.get_latency() == wait_states)?;
        self.regs.sync();

        debug!("flash latency set to {} wait states", wait_states);
        Ok(())
    }

    pub fn get_latency(&self) -> u32 {
        self.acr().read(ACR::LATENCY)
    }

    /// Turn on the instruction and data caches. Best effort, idempotent, no
    /// readback confirmation.
    pub fn enable_caches(&self) {
        self.modify_acr(ACR::ICEN::SET + ACR::DCEN::SET);
        self.regs.sync();
    }

    /// Turn on the prefetch unit. Best effort, idempotent, no readback
    /// confirmation.
    pub fn enable_prefetch(&self) {
        self.modify_acr(ACR::PRFTEN::SET);
        self.regs.sync();
    }

    // Minimum wait states for a system clock frequency, from the datasheet
    // table for the 2.7 to 3.6 V supply fitted on this board.
    pub(crate) fn wait_states_for_frequency(&self, sys_clock_hz: u32) -> u32 {
        if sys_clock_hz <= 30_000_000 {
            0
        } else if sys_clock_hz <= 60_000_000 {
            1
        } else {
            2
        }
    }
}
