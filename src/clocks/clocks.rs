// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! System clock bring-up and frequency derivation.
//!
//! [Clocks] owns the one-shot switch of the system clock from the boot HSI
//! to the PLL, and afterwards answers every frequency query in the system.
//!
//! # Bring-up
//!
//! [Clocks::setup_system_clock] walks a strictly sequential state machine.
//! Every transition blocks on the hardware status bit that confirms the
//! previous step took effect, and the hardware-mandated ordering is fixed:
//! the regulator scale and the flash wait states are raised before the
//! switch to the higher frequency, and the PLL must report lock before it
//! may be selected. The routine runs exactly once; a second invocation
//! fails with [ErrorCode::AlreadyInitialized] before touching a single
//! register, because re-running part of the sequence against a live clock
//! could glitch it. There is no teardown path.
//!
//! # Frequency derivation
//!
//! [Clocks::get_frequency] recomputes the requested domain's frequency from
//! the live register contents on every call. Nothing is cached: the
//! registers are the single source of truth, and the value returned always
//! matches what was physically programmed. A source the hardware reports
//! that cannot be resolved (the reserved mux encoding, or the HSE which is
//! not fitted on this board) yields `0`, and callers treat `0` as fatal.

use core::cell::Cell;

use crate::clocks::hsi::{Hsi, HSI_FREQUENCY_HZ};
use crate::clocks::pll::{Pll, PllConfig};
use crate::error::ErrorCode;
use crate::flash::Flash;
use crate::pwr::{Pwr, VoltageScale};
use crate::rcc::{
    AHBPrescaler, APBPrescaler, GpioBank, PllSource, Rcc, SysClockSource, Usart, PLLP,
};
use crate::regfile::RegisterFile;

// Bus frequency ceilings of this part.
const APB1_FREQUENCY_LIMIT_HZ: u32 = 42_000_000;
const APB2_FREQUENCY_LIMIT_HZ: u32 = 84_000_000;

/// The clock domains a peripheral can ask about.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDomain {
    /// Output of the system clock mux
    System,
    /// Core, AHB bus and memory clock (HCLK)
    Core,
    /// APB1 peripheral clock (PCLK1)
    Apb1Peripheral,
    /// APB2 peripheral clock (PCLK2)
    Apb2Peripheral,
    /// Clock of the timers hanging off APB1
    Apb1Timer,
    /// Clock of the timers hanging off APB2
    Apb2Timer,
}

/// Progress of the one-shot bring-up sequence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerState {
    Uninitialized,
    OscillatorReady,
    ScalingSet,
    LatencySet,
    PllProgrammed,
    PllLocked,
    Switched,
    Complete,
}

/// Everything the bring-up sequence programs, chosen once per board.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemClockConfig {
    pub pll: PllConfig,
    pub scale: VoltageScale,
    pub ahb_prescaler: AHBPrescaler,
    pub apb1_prescaler: APBPrescaler,
    pub apb2_prescaler: APBPrescaler,
}

/// 84 MHz system clock from the 16 MHz HSI, the configuration this board
/// boots with: VCO input 1 MHz, VCO output 336 MHz, APB1 held at its
/// 42 MHz ceiling.
pub const SYS_CLOCK_84MHZ: SystemClockConfig = SystemClockConfig {
    pll: PllConfig {
        m: 16,
        n: 336,
        p: PLLP::DivideBy4,
        q: 8,
        source: PllSource::HSI,
    },
    scale: VoltageScale::Scale2,
    ahb_prescaler: AHBPrescaler::DivideBy1,
    apb1_prescaler: APBPrescaler::DivideBy2,
    apb2_prescaler: APBPrescaler::DivideBy1,
};

/// Main struct for configuring the on-board clocks.
pub struct Clocks<'a, RF: RegisterFile> {
    rcc: &'a Rcc<'a, RF>,
    pwr: &'a Pwr<'a, RF>,
    flash: &'a Flash<'a, RF>,
    /// High speed internal oscillator
    pub hsi: Hsi<'a, RF>,
    /// Main phase-locked loop
    pub pll: Pll<'a, RF>,
    state: Cell<SequencerState>,
}

impl<'a, RF: RegisterFile> Clocks<'a, RF> {
    pub fn new(rcc: &'a Rcc<'a, RF>, pwr: &'a Pwr<'a, RF>, flash: &'a Flash<'a, RF>) -> Self {
        Self {
            rcc,
            pwr,
            flash,
            hsi: Hsi::new(rcc),
            pll: Pll::new(rcc),
            state: Cell::new(SequencerState::Uninitialized),
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state.get()
    }

    /// One-shot switch of the system clock to the PLL.
    ///
    /// Validates the whole configuration before the first register write,
    /// then performs, in order: power interface gate, oscillator readiness,
    /// regulator scaling, flash latency, PLL programming and lock,
    /// prescalers, mux switch. On hardware every wait spins until the
    /// corresponding status bit rises; a step that never completes is a
    /// permanent hang rather than an error return, and a failure partway
    /// leaves the sequence where it stopped (there is no rollback).
    ///
    /// # Errors
    ///
    /// + [Err]\([ErrorCode::AlreadyInitialized]\): the sequence already ran.
    ///   No register is touched in this case.
    /// + [Err]\([ErrorCode::InvalidParameter]\): a PLL field is out of
    ///   range, or the requested tree violates a frequency ceiling (the
    ///   regulator scale's system limit, 42 MHz on APB1, 84 MHz on APB2).
    ///   No register is touched in this case either.
    pub fn setup_system_clock(&self, config: &SystemClockConfig) -> Result<(), ErrorCode> {
        if self.state.get() != SequencerState::Uninitialized {
            error!("clock bring-up invoked twice");
            return Err(ErrorCode::AlreadyInitialized);
        }

        config.pll.validate()?;
        let target_hz = config.pll.output_frequency_hz(HSI_FREQUENCY_HZ);
        if target_hz > config.scale.max_sys_clock_hz() {
            return Err(ErrorCode::InvalidParameter);
        }
        let core_hz = target_hz / u32::from(config.ahb_prescaler);
        if core_hz / u32::from(config.apb1_prescaler) > APB1_FREQUENCY_LIMIT_HZ {
            return Err(ErrorCode::InvalidParameter);
        }
        if core_hz / u32::from(config.apb2_prescaler) > APB2_FREQUENCY_LIMIT_HZ {
            return Err(ErrorCode::InvalidParameter);
        }

        // The scaling write below needs the power interface clock running.
        self.rcc.enable_pwr_clock()?;

        self.hsi.enable()?;
        self.state.set(SequencerState::OscillatorReady);

        self.pwr.set_scaling(config.scale)?;
        self.state.set(SequencerState::ScalingSet);

        self.flash
            .set_latency(self.flash.wait_states_for_frequency(target_hz))?;
        self.state.set(SequencerState::LatencySet);

        self.pll.configure(&config.pll)?;
        self.state.set(SequencerState::PllProgrammed);

        self.pll.enable();
        self.pll.wait_lock()?;
        self.state.set(SequencerState::PllLocked);

        self.rcc.set_ahb_prescaler(config.ahb_prescaler);
        self.rcc.set_apb1_prescaler(config.apb1_prescaler);
        self.rcc.set_apb2_prescaler(config.apb2_prescaler);

        self.rcc.set_sys_clock_source(SysClockSource::PLL);
        self.rcc
            .regfile()
            .wait_until(|_| self.rcc.sys_clock_status() == Some(SysClockSource::PLL))?;
        self.state.set(SequencerState::Switched);

        self.state.set(SequencerState::Complete);
        info!("system clock running at {} Hz from the PLL", target_hz);
        Ok(())
    }

    /// The live frequency of `domain` in Hz, or `0` when the system clock
    /// source cannot be resolved. Callers must treat `0` as fatal.
    ///
    /// Every call re-reads the registers. The PLL branch reuses the exact
    /// divide-before-multiply order the configurator programmed, so a
    /// round trip through [Clocks::setup_system_clock] and this query is
    /// lossless.
    pub fn get_frequency(&self, domain: ClockDomain) -> u32 {
        let sys_hz = match self.rcc.sys_clock_status() {
            Some(SysClockSource::HSI) => HSI_FREQUENCY_HZ,
            Some(SysClockSource::PLL) => self.pll.frequency_hz(),
            // The HSE is not fitted, so neither it nor the reserved
            // encoding resolves to a frequency.
            Some(SysClockSource::HSE) | None => 0,
        };
        if sys_hz == 0 {
            return 0;
        }

        let core_hz = sys_hz / u32::from(self.rcc.get_ahb_prescaler());
        match domain {
            ClockDomain::System => sys_hz,
            ClockDomain::Core => core_hz,
            ClockDomain::Apb1Peripheral | ClockDomain::Apb1Timer => {
                let divisor = u32::from(self.rcc.get_apb1_prescaler());
                let pclk = core_hz / divisor;
                // Timers run at twice their bus clock whenever the bus
                // prescaler actually divides.
                if domain == ClockDomain::Apb1Timer && divisor > 1 {
                    pclk * 2
                } else {
                    pclk
                }
            }
            ClockDomain::Apb2Peripheral | ClockDomain::Apb2Timer => {
                let divisor = u32::from(self.rcc.get_apb2_prescaler());
                let pclk = core_hz / divisor;
                if domain == ClockDomain::Apb2Timer && divisor > 1 {
                    pclk * 2
                } else {
                    pclk
                }
            }
        }
    }

    /// The core clock frequency, failing instead of returning the `0`
    /// sentinel. The periodic tick timer derives its reload value from
    /// this.
    pub fn core_frequency(&self) -> Result<u32, ErrorCode> {
        match self.get_frequency(ClockDomain::Core) {
            0 => {
                error!("core clock frequency is not available");
                Err(ErrorCode::NotAvailable)
            }
            hz => Ok(hz),
        }
    }

    /// Gate on the bus clock of a GPIO bank. Stays enabled for the life of
    /// the system.
    pub fn enable_gpio_bank(&self, bank: GpioBank) -> Result<(), ErrorCode> {
        self.rcc.enable_gpio_clock(bank)?;
        trace!("GPIO bank clock enabled: {}", bank as u32);
        Ok(())
    }

    /// Gate on the bus clock of a USART instance. Stays enabled for the
    /// life of the system.
    pub fn enable_usart(&self, usart: Usart) -> Result<(), ErrorCode> {
        self.rcc.enable_usart_clock(usart)?;
        trace!("USART clock enabled: {}", usart as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regfile::testing::FakeRegisters;
    use crate::regfile::Register;

    const SWS_PLL: u32 = 0b10 << 2;

    struct Board<'a> {
        rcc: Rcc<'a, FakeRegisters>,
        pwr: Pwr<'a, FakeRegisters>,
        flash: Flash<'a, FakeRegisters>,
    }

    impl<'a> Board<'a> {
        fn new(regs: &'a FakeRegisters) -> Self {
            Self {
                rcc: Rcc::new(regs),
                pwr: Pwr::new(regs),
                flash: Flash::new(regs),
            }
        }

        fn clocks(&'a self) -> Clocks<'a, FakeRegisters> {
            Clocks::new(&self.rcc, &self.pwr, &self.flash)
        }
    }

    fn pllcfgr_word(m: u32, n: u32, p_encoding: u32) -> u32 {
        m | n << 6 | p_encoding << 16
    }

    #[test]
    fn boot_tree_runs_from_the_hsi() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        assert_eq!(SequencerState::Uninitialized, clocks.state());
        for domain in [
            ClockDomain::System,
            ClockDomain::Core,
            ClockDomain::Apb1Peripheral,
            ClockDomain::Apb2Peripheral,
            ClockDomain::Apb1Timer,
            ClockDomain::Apb2Timer,
        ] {
            assert_eq!(HSI_FREQUENCY_HZ, clocks.get_frequency(domain));
        }
        assert_eq!(Ok(HSI_FREQUENCY_HZ), clocks.core_frequency());
    }

    #[test]
    fn bring_up_produces_the_84mhz_tree() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        assert_eq!(Ok(()), clocks.setup_system_clock(&SYS_CLOCK_84MHZ));
        assert_eq!(SequencerState::Complete, clocks.state());

        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::System));
        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::Core));
        assert_eq!(42_000_000, clocks.get_frequency(ClockDomain::Apb1Peripheral));
        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::Apb1Timer));
        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::Apb2Peripheral));
        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::Apb2Timer));

        // The supporting state the sequence must have left behind: mux on
        // the PLL, two flash wait states, regulator at scale 2, power
        // interface gated on.
        assert_eq!(SWS_PLL, regs.peek(Register::RccCfgr) & 0b1100);
        assert_eq!(2, board.flash.get_latency());
        assert_eq!(Some(VoltageScale::Scale2), board.pwr.get_scaling());
        assert_ne!(0, regs.peek(Register::RccApb1enr) & 1 << 28);
    }

    #[test]
    fn bring_up_is_one_shot() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        assert_eq!(Ok(()), clocks.setup_system_clock(&SYS_CLOCK_84MHZ));
        let writes_after_first = regs.write_count();

        assert_eq!(
            Err(ErrorCode::AlreadyInitialized),
            clocks.setup_system_clock(&SYS_CLOCK_84MHZ)
        );
        assert_eq!(writes_after_first, regs.write_count());
        assert_eq!(SequencerState::Complete, clocks.state());
    }

    #[test]
    fn rejected_configurations_touch_no_register() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        // Out-of-range PLL multiplier.
        let mut config = SYS_CLOCK_84MHZ;
        config.pll.n = 433;
        assert_eq!(
            Err(ErrorCode::InvalidParameter),
            clocks.setup_system_clock(&config)
        );

        // 84 MHz exceeds the scale 3 regulator ceiling.
        config = SYS_CLOCK_84MHZ;
        config.scale = VoltageScale::Scale3;
        assert_eq!(
            Err(ErrorCode::InvalidParameter),
            clocks.setup_system_clock(&config)
        );

        // An undivided APB1 would run at 84 MHz, over its 42 MHz limit.
        config = SYS_CLOCK_84MHZ;
        config.apb1_prescaler = APBPrescaler::DivideBy1;
        assert_eq!(
            Err(ErrorCode::InvalidParameter),
            clocks.setup_system_clock(&config)
        );

        assert_eq!(0, regs.write_count());
        assert_eq!(SequencerState::Uninitialized, clocks.state());
    }

    #[test]
    fn stuck_pll_surfaces_instead_of_hanging() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        regs.stick_pll();
        assert_eq!(
            Err(ErrorCode::Busy),
            clocks.setup_system_clock(&SYS_CLOCK_84MHZ)
        );
        // The sequence stopped where the lock wait gave up; nothing rolls
        // back and the mux never moved off the HSI.
        assert_eq!(SequencerState::PllProgrammed, clocks.state());
        assert_eq!(
            Some(SysClockSource::HSI),
            board.rcc.sys_clock_status()
        );
    }

    #[test]
    fn pll_derivation_is_exact_over_the_full_field_range() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        regs.poke(Register::RccCfgr, SWS_PLL);
        for m in 2..=63u32 {
            for n in 50..=432u32 {
                for p_encoding in 0..=3u32 {
                    regs.poke(Register::RccPllcfgr, pllcfgr_word(m, n, p_encoding));
                    let expected = HSI_FREQUENCY_HZ / m * n / ((p_encoding + 1) * 2);
                    assert_eq!(expected, clocks.get_frequency(ClockDomain::System));
                }
            }
        }
    }

    #[test]
    fn ahb_prescaler_table_divides_the_core_clock() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        regs.poke(Register::RccPllcfgr, pllcfgr_word(16, 336, 1));

        let divisors: [u32; 8] = [2, 4, 8, 16, 64, 128, 256, 512];
        for (index, divisor) in divisors.iter().enumerate() {
            let encoding = 0b1000 + index as u32;
            regs.poke(Register::RccCfgr, SWS_PLL | encoding << 4);
            assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::System));
            assert_eq!(
                84_000_000 / divisor,
                clocks.get_frequency(ClockDomain::Core)
            );
        }

        // Divide bit clear: the low bits are ignored and nothing divides.
        regs.poke(Register::RccCfgr, SWS_PLL | 0b0110 << 4);
        assert_eq!(
            clocks.get_frequency(ClockDomain::System),
            clocks.get_frequency(ClockDomain::Core)
        );
    }

    #[test]
    fn apb_prescaler_tables_and_timer_doubling() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        regs.poke(Register::RccPllcfgr, pllcfgr_word(16, 336, 1));

        let divisors: [u32; 4] = [2, 4, 8, 16];
        for (index, divisor) in divisors.iter().enumerate() {
            let encoding = 0b100 + index as u32;

            regs.poke(Register::RccCfgr, SWS_PLL | encoding << 10);
            let pclk1 = clocks.get_frequency(ClockDomain::Apb1Peripheral);
            assert_eq!(84_000_000 / divisor, pclk1);
            // A dividing prescaler doubles the timer clock.
            assert_eq!(2 * pclk1, clocks.get_frequency(ClockDomain::Apb1Timer));

            regs.poke(Register::RccCfgr, SWS_PLL | encoding << 13);
            let pclk2 = clocks.get_frequency(ClockDomain::Apb2Peripheral);
            assert_eq!(84_000_000 / divisor, pclk2);
            assert_eq!(2 * pclk2, clocks.get_frequency(ClockDomain::Apb2Timer));
        }

        // An undivided bus feeds its timers directly.
        regs.poke(Register::RccCfgr, SWS_PLL);
        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::Apb1Timer));
        assert_eq!(84_000_000, clocks.get_frequency(ClockDomain::Apb2Timer));
    }

    #[test]
    fn unresolvable_source_reads_zero_everywhere() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        // The reserved mux status encoding.
        regs.poke(Register::RccCfgr, 0b11 << 2);
        for domain in [
            ClockDomain::System,
            ClockDomain::Core,
            ClockDomain::Apb1Peripheral,
            ClockDomain::Apb2Peripheral,
            ClockDomain::Apb1Timer,
            ClockDomain::Apb2Timer,
        ] {
            assert_eq!(0, clocks.get_frequency(domain));
        }
        assert_eq!(Err(ErrorCode::NotAvailable), clocks.core_frequency());

        // The HSE encodings are defined but the oscillator is not fitted.
        regs.poke(Register::RccCfgr, 0b01 << 2);
        assert_eq!(0, clocks.get_frequency(ClockDomain::System));
        regs.poke(Register::RccCfgr, SWS_PLL);
        regs.poke(Register::RccPllcfgr, pllcfgr_word(16, 336, 1) | 1 << 22);
        assert_eq!(0, clocks.get_frequency(ClockDomain::System));
    }

    #[test]
    fn gate_controller_enables_and_rejects() {
        let regs = FakeRegisters::new();
        let board = Board::new(&regs);
        let clocks = board.clocks();

        assert_eq!(Ok(()), clocks.enable_gpio_bank(GpioBank::GPIOA));
        assert_ne!(0, regs.peek(Register::RccAhb1enr) & 1);

        let ahb1enr_before = regs.peek(Register::RccAhb1enr);
        let writes_before = regs.write_count();
        assert_eq!(
            Err(ErrorCode::InvalidParameter),
            clocks.enable_gpio_bank(GpioBank::GPIOG)
        );
        assert_eq!(ahb1enr_before, regs.peek(Register::RccAhb1enr));
        assert_eq!(writes_before, regs.write_count());

        assert_eq!(Ok(()), clocks.enable_usart(Usart::USART2));
        assert_ne!(0, regs.peek(Register::RccApb1enr) & 1 << 17);
    }
}
