// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

//! Reset and clock control (RCC) register driver for the STM32F401RE.
//!
//! Field-level accessors over the RCC block, plus the peripheral clock
//! gates for the GPIO banks and USART instances wired on this part. The
//! clock drivers in [crate::clocks] compose these accessors; nothing here
//! caches register contents.

use tock_registers::fields::FieldValue;
use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::error::ErrorCode;
use crate::regfile::{Register, RegisterFile};

register_bitfields![u32,
    CR [
        /// PLLI2S clock ready flag
        PLLI2SRDY OFFSET(27) NUMBITS(1) [],
        /// PLLI2S enable
        PLLI2SON OFFSET(26) NUMBITS(1) [],
        /// Main PLL clock ready flag
        PLLRDY OFFSET(25) NUMBITS(1) [],
        /// Main PLL enable
        PLLON OFFSET(24) NUMBITS(1) [],
        /// Clock security system enable
        CSSON OFFSET(19) NUMBITS(1) [],
        /// HSE clock bypass
        HSEBYP OFFSET(18) NUMBITS(1) [],
        /// HSE clock ready flag
        HSERDY OFFSET(17) NUMBITS(1) [],
        /// HSE clock enable
        HSEON OFFSET(16) NUMBITS(1) [],
        /// Internal high-speed clock calibration
        HSICAL OFFSET(8) NUMBITS(8) [],
        /// Internal high-speed clock trimming
        HSITRIM OFFSET(3) NUMBITS(5) [],
        /// Internal high-speed clock ready flag
        HSIRDY OFFSET(1) NUMBITS(1) [],
        /// Internal high-speed clock enable
        HSION OFFSET(0) NUMBITS(1) []
    ],
    PLLCFGR [
        /// PLL division factor for USB OTG FS and SDIO clocks
        PLLQ OFFSET(24) NUMBITS(4) [],
        /// PLL entry clock source
        PLLSRC OFFSET(22) NUMBITS(1) [
            HSI = 0,
            HSE = 1,
        ],
        /// PLL division factor for the main system clock
        PLLP OFFSET(16) NUMBITS(2) [],
        /// PLL multiplication factor for the VCO
        PLLN OFFSET(6) NUMBITS(9) [],
        /// Division factor for the PLL input clock
        PLLM OFFSET(0) NUMBITS(6) []
    ],
    CFGR [
        /// Microcontroller clock output 2
        MCO2 OFFSET(30) NUMBITS(2) [],
        /// MCO2 prescaler
        MCO2PRE OFFSET(27) NUMBITS(3) [],
        /// MCO1 prescaler
        MCO1PRE OFFSET(24) NUMBITS(3) [],
        /// I2S clock selection
        I2SSRC OFFSET(23) NUMBITS(1) [],
        /// Microcontroller clock output 1
        MCO1 OFFSET(21) NUMBITS(2) [],
        /// HSE division factor for the RTC clock
        RTCPRE OFFSET(16) NUMBITS(5) [],
        /// APB high-speed prescaler (APB2)
        PPRE2 OFFSET(13) NUMBITS(3) [],
        /// APB low-speed prescaler (APB1)
        PPRE1 OFFSET(10) NUMBITS(3) [],
        /// AHB prescaler
        HPRE OFFSET(4) NUMBITS(4) [],
        /// System clock switch status
        SWS OFFSET(2) NUMBITS(2) [],
        /// System clock switch
        SW OFFSET(0) NUMBITS(2) [
            HSI = 0b00,
            HSE = 0b01,
            PLL = 0b10,
        ]
    ],
    AHB1ENR [
        /// DMA2 clock enable
        DMA2EN OFFSET(22) NUMBITS(1) [],
        /// DMA1 clock enable
        DMA1EN OFFSET(21) NUMBITS(1) [],
        /// CRC clock enable
        CRCEN OFFSET(12) NUMBITS(1) [],
        /// IO port H clock enable
        GPIOHEN OFFSET(7) NUMBITS(1) [],
        /// IO port E clock enable
        GPIOEEN OFFSET(4) NUMBITS(1) [],
        /// IO port D clock enable
        GPIODEN OFFSET(3) NUMBITS(1) [],
        /// IO port C clock enable
        GPIOCEN OFFSET(2) NUMBITS(1) [],
        /// IO port B clock enable
        GPIOBEN OFFSET(1) NUMBITS(1) [],
        /// IO port A clock enable
        GPIOAEN OFFSET(0) NUMBITS(1) []
    ],
    APB1ENR [
        /// Power interface clock enable
        PWREN OFFSET(28) NUMBITS(1) [],
        /// I2C3 clock enable
        I2C3EN OFFSET(23) NUMBITS(1) [],
        /// I2C2 clock enable
        I2C2EN OFFSET(22) NUMBITS(1) [],
        /// I2C1 clock enable
        I2C1EN OFFSET(21) NUMBITS(1) [],
        /// USART2 clock enable
        USART2EN OFFSET(17) NUMBITS(1) [],
        /// SPI3 clock enable
        SPI3EN OFFSET(15) NUMBITS(1) [],
        /// SPI2 clock enable
        SPI2EN OFFSET(14) NUMBITS(1) [],
        /// Window watchdog clock enable
        WWDGEN OFFSET(11) NUMBITS(1) [],
        /// TIM5 clock enable
        TIM5EN OFFSET(3) NUMBITS(1) [],
        /// TIM4 clock enable
        TIM4EN OFFSET(2) NUMBITS(1) [],
        /// TIM3 clock enable
        TIM3EN OFFSET(1) NUMBITS(1) [],
        /// TIM2 clock enable
        TIM2EN OFFSET(0) NUMBITS(1) []
    ],
    APB2ENR [
        /// TIM11 clock enable
        TIM11EN OFFSET(18) NUMBITS(1) [],
        /// TIM10 clock enable
        TIM10EN OFFSET(17) NUMBITS(1) [],
        /// TIM9 clock enable
        TIM9EN OFFSET(16) NUMBITS(1) [],
        /// System configuration controller clock enable
        SYSCFGEN OFFSET(14) NUMBITS(1) [],
        /// SPI4 clock enable
        SPI4EN OFFSET(13) NUMBITS(1) [],
        /// SPI1 clock enable
        SPI1EN OFFSET(12) NUMBITS(1) [],
        /// SDIO clock enable
        SDIOEN OFFSET(11) NUMBITS(1) [],
        /// ADC1 clock enable
        ADC1EN OFFSET(8) NUMBITS(1) [],
        /// USART6 clock enable
        USART6EN OFFSET(5) NUMBITS(1) [],
        /// USART1 clock enable
        USART1EN OFFSET(4) NUMBITS(1) [],
        /// TIM1 clock enable
        TIM1EN OFFSET(0) NUMBITS(1) []
    ]
];

// Default HSI trim value programmed together with HSION.
const HSI_TRIM_DEFAULT: u32 = 16;

pub struct Rcc<'a, RF: RegisterFile> {
    regs: &'a RF,
}

impl<'a, RF: RegisterFile> Rcc<'a, RF> {
    pub const fn new(regs: &'a RF) -> Self {
        Self { regs }
    }

    pub(crate) fn regfile(&self) -> &'a RF {
        self.regs
    }

    fn cr(&self) -> LocalRegisterCopy<u32, CR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::RccCr))
    }

    fn modify_cr(&self, fields: FieldValue<u32, CR::Register>) {
        let value = self.regs.read(Register::RccCr);
        self.regs.write(Register::RccCr, fields.modify(value));
    }

    fn pllcfgr(&self) -> LocalRegisterCopy<u32, PLLCFGR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::RccPllcfgr))
    }

    fn modify_pllcfgr(&self, fields: FieldValue<u32, PLLCFGR::Register>) {
        let value = self.regs.read(Register::RccPllcfgr);
        self.regs.write(Register::RccPllcfgr, fields.modify(value));
    }

    fn cfgr(&self) -> LocalRegisterCopy<u32, CFGR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::RccCfgr))
    }

    fn modify_cfgr(&self, fields: FieldValue<u32, CFGR::Register>) {
        let value = self.regs.read(Register::RccCfgr);
        self.regs.write(Register::RccCfgr, fields.modify(value));
    }

    fn ahb1enr(&self) -> LocalRegisterCopy<u32, AHB1ENR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::RccAhb1enr))
    }

    fn modify_ahb1enr(&self, fields: FieldValue<u32, AHB1ENR::Register>) {
        let value = self.regs.read(Register::RccAhb1enr);
        self.regs.write(Register::RccAhb1enr, fields.modify(value));
    }

    fn apb1enr(&self) -> LocalRegisterCopy<u32, APB1ENR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::RccApb1enr))
    }

    fn modify_apb1enr(&self, fields: FieldValue<u32, APB1ENR::Register>) {
        let value = self.regs.read(Register::RccApb1enr);
        self.regs.write(Register::RccApb1enr, fields.modify(value));
    }

    fn apb2enr(&self) -> LocalRegisterCopy<u32, APB2ENR::Register> {
        LocalRegisterCopy::new(self.regs.read(Register::RccApb2enr))
    }

    fn modify_apb2enr(&self, fields: FieldValue<u32, APB2ENR::Register>) {
        let value = self.regs.read(Register::RccApb2enr);
        self.regs.write(Register::RccApb2enr, fields.modify(value));
    }

    /* HSI clock */

    // Enables the HSI together with its default calibration trim.
    pub(crate) fn enable_hsi_clock(&self) {
        self.modify_cr(CR::HSION::SET + CR::HSITRIM.val(HSI_TRIM_DEFAULT));
    }

    pub(crate) fn is_enabled_hsi_clock(&self) -> bool {
        self.cr().is_set(CR::HSION)
    }

    // Indicates whether the HSI oscillator is stable
    pub(crate) fn is_ready_hsi_clock(&self) -> bool {
        self.cr().is_set(CR::HSIRDY)
    }

    /* Main PLL clock */

    pub(crate) fn enable_pll_clock(&self) {
        self.modify_cr(CR::PLLON::SET);
    }

    pub(crate) fn is_enabled_pll_clock(&self) -> bool {
        self.cr().is_set(CR::PLLON)
    }

    // The PLL clock is locked when its output signal is stable
    pub(crate) fn is_locked_pll_clock(&self) -> bool {
        self.cr().is_set(CR::PLLRDY)
    }

    pub(crate) fn get_pll_source(&self) -> PllSource {
        match self.pllcfgr().read(PLLCFGR::PLLSRC) {
            0b0 => PllSource::HSI,
            _ => PllSource::HSE,
        }
    }

    // Field writes are ignored by the hardware while the PLL runs; callers
    // gate on is_enabled_pll_clock() first.
    pub(crate) fn set_pll_source(&self, source: PllSource) {
        self.modify_pllcfgr(PLLCFGR::PLLSRC.val(source as u32));
    }

    pub(crate) fn get_pll_m_divider(&self) -> u32 {
        self.pllcfgr().read(PLLCFGR::PLLM)
    }

    pub(crate) fn set_pll_m_divider(&self, m: u8) {
        self.modify_pllcfgr(PLLCFGR::PLLM.val(m as u32));
    }

    pub(crate) fn get_pll_n_multiplier(&self) -> u32 {
        self.pllcfgr().read(PLLCFGR::PLLN)
    }

    pub(crate) fn set_pll_n_multiplier(&self, n: u16) {
        self.modify_pllcfgr(PLLCFGR::PLLN.val(n as u32));
    }

    pub(crate) fn get_pll_p_divider(&self) -> PLLP {
        match self.pllcfgr().read(PLLCFGR::PLLP) {
            0b00 => PLLP::DivideBy2,
            0b01 => PLLP::DivideBy4,
            0b10 => PLLP::DivideBy6,
            _ => PLLP::DivideBy8,
        }
    }

    pub(crate) fn set_pll_p_divider(&self, p: PLLP) {
        self.modify_pllcfgr(PLLCFGR::PLLP.val(p as u32));
    }

    pub(crate) fn _get_pll_q_divider(&self) -> u32 {
        self.pllcfgr().read(PLLCFGR::PLLQ)
    }

    pub(crate) fn set_pll_q_divider(&self, q: u8) {
        self.modify_pllcfgr(PLLCFGR::PLLQ.val(q as u32));
    }

    /* System clock mux */

    pub(crate) fn set_sys_clock_source(&self, source: SysClockSource) {
        self.modify_cfgr(CFGR::SW.val(source as u32));
    }

    // Decodes the switch status field. The reserved encoding reads as None
    // so frequency queries can report the source as unresolvable instead of
    // guessing.
    pub(crate) fn sys_clock_status(&self) -> Option<SysClockSource> {
        match self.cfgr().read(CFGR::SWS) {
            0b00 => Some(SysClockSource::HSI),
            0b01 => Some(SysClockSource::HSE),
            0b10 => Some(SysClockSource::PLL),
            _ => None,
        }
    }

    /* AHB and APB prescalers */

    pub(crate) fn set_ahb_prescaler(&self, prescaler: AHBPrescaler) {
        self.modify_cfgr(CFGR::HPRE.val(prescaler as u32));
    }

    pub(crate) fn get_ahb_prescaler(&self) -> AHBPrescaler {
        match self.cfgr().read(CFGR::HPRE) {
            0b1000 => AHBPrescaler::DivideBy2,
            0b1001 => AHBPrescaler::DivideBy4,
            0b1010 => AHBPrescaler::DivideBy8,
            0b1011 => AHBPrescaler::DivideBy16,
            0b1100 => AHBPrescaler::DivideBy64,
            0b1101 => AHBPrescaler::DivideBy128,
            0b1110 => AHBPrescaler::DivideBy256,
            0b1111 => AHBPrescaler::DivideBy512,
            // 0b0xxx means no division
            _ => AHBPrescaler::DivideBy1,
        }
    }

    pub(crate) fn set_apb1_prescaler(&self, prescaler: APBPrescaler) {
        self.modify_cfgr(CFGR::PPRE1.val(prescaler as u32));
    }

    pub(crate) fn get_apb1_prescaler(&self) -> APBPrescaler {
        match self.cfgr().read(CFGR::PPRE1) {
            0b100 => APBPrescaler::DivideBy2,
            0b101 => APBPrescaler::DivideBy4,
            0b110 => APBPrescaler::DivideBy8,
            0b111 => APBPrescaler::DivideBy16,
            // 0b0xx means no division
            _ => APBPrescaler::DivideBy1,
        }
    }

    pub(crate) fn set_apb2_prescaler(&self, prescaler: APBPrescaler) {
        self.modify_cfgr(CFGR::PPRE2.val(prescaler as u32));
    }

    pub(crate) fn get_apb2_prescaler(&self) -> APBPrescaler {
        match self.cfgr().read(CFGR::PPRE2) {
            0b100 => APBPrescaler::DivideBy2,
            0b101 => APBPrescaler::DivideBy4,
            0b110 => APBPrescaler::DivideBy8,
            0b111 => APBPrescaler::DivideBy16,
            _ => APBPrescaler::DivideBy1,
        }
    }

    /* Peripheral clock gates */

    // The power interface clock must be gated on before any PWR register
    // access.
    pub(crate) fn enable_pwr_clock(&self) -> Result<(), ErrorCode> {
        self.modify_apb1enr(APB1ENR::PWREN::SET);
        self.regs
            .wait_until(|_| self.apb1enr().is_set(APB1ENR::PWREN))
    }

    // Enables the bus clock of a GPIO bank. Banks F and G exist in the
    // family but are not wired on this package; asking for them fails
    // before any register write.
    pub(crate) fn enable_gpio_clock(&self, bank: GpioBank) -> Result<(), ErrorCode> {
        let field = match bank {
            GpioBank::GPIOA => AHB1ENR::GPIOAEN::SET,
            GpioBank::GPIOB => AHB1ENR::GPIOBEN::SET,
            GpioBank::GPIOC => AHB1ENR::GPIOCEN::SET,
            GpioBank::GPIOD => AHB1ENR::GPIODEN::SET,
            GpioBank::GPIOE => AHB1ENR::GPIOEEN::SET,
            GpioBank::GPIOH => AHB1ENR::GPIOHEN::SET,
            GpioBank::GPIOF | GpioBank::GPIOG => {
                error!("no such GPIO bank on this package: {}", bank as u32);
                return Err(ErrorCode::InvalidParameter);
            }
        };
        self.modify_ahb1enr(field);
        self.regs.wait_until(|_| self.ahb1enr().matches_all(field))
    }

    pub(crate) fn enable_usart_clock(&self, usart: Usart) -> Result<(), ErrorCode> {
        match usart {
            Usart::USART1 => {
                self.modify_apb2enr(APB2ENR::USART1EN::SET);
                self.regs
                    .wait_until(|_| self.apb2enr().is_set(APB2ENR::USART1EN))
            }
            Usart::USART2 => {
                self.modify_apb1enr(APB1ENR::USART2EN::SET);
                self.regs
                    .wait_until(|_| self.apb1enr().is_set(APB1ENR::USART2EN))
            }
            Usart::USART6 => {
                self.modify_apb2enr(APB2ENR::USART6EN::SET);
                self.regs
                    .wait_until(|_| self.apb2enr().is_set(APB2ENR::USART6EN))
            }
        }
    }
}

/// Clock sources for the system clock mux.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SysClockSource {
    HSI = 0b00,
    HSE = 0b01,
    PLL = 0b10,
}

/// Input sources for the PLL. Only the HSI is wired on this board.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllSource {
    HSI = 0b0,
    HSE = 0b1,
}

/// Output divider of the PLL, as encoded in the PLLP field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PLLP {
    DivideBy2 = 0b00,
    DivideBy4 = 0b01,
    DivideBy6 = 0b10,
    DivideBy8 = 0b11,
}

impl From<PLLP> for u32 {
    // (field_value + 1) * 2 = X for X in DivideByX
    fn from(item: PLLP) -> Self {
        (item as u32 + 1) << 1
    }
}

/// AHB prescaler. The high bit of the field enables division, the low bits
/// index the divisor table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AHBPrescaler {
    DivideBy1 = 0b0000,
    DivideBy2 = 0b1000,
    DivideBy4 = 0b1001,
    DivideBy8 = 0b1010,
    DivideBy16 = 0b1011,
    DivideBy64 = 0b1100,
    DivideBy128 = 0b1101,
    DivideBy256 = 0b1110,
    DivideBy512 = 0b1111,
}

impl From<AHBPrescaler> for u32 {
    fn from(item: AHBPrescaler) -> u32 {
        match item {
            AHBPrescaler::DivideBy1 => 1,
            AHBPrescaler::DivideBy2 => 2,
            AHBPrescaler::DivideBy4 => 4,
            AHBPrescaler::DivideBy8 => 8,
            AHBPrescaler::DivideBy16 => 16,
            AHBPrescaler::DivideBy64 => 64,
            AHBPrescaler::DivideBy128 => 128,
            AHBPrescaler::DivideBy256 => 256,
            AHBPrescaler::DivideBy512 => 512,
        }
    }
}

/// APB prescaler, shared encoding for APB1 and APB2.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum APBPrescaler {
    DivideBy1 = 0b000,
    DivideBy2 = 0b100,
    DivideBy4 = 0b101,
    DivideBy8 = 0b110,
    DivideBy16 = 0b111,
}

impl From<APBPrescaler> for u32 {
    fn from(item: APBPrescaler) -> Self {
        match item {
            APBPrescaler::DivideBy1 => 1,
            APBPrescaler::DivideBy2 => 2,
            APBPrescaler::DivideBy4 => 4,
            APBPrescaler::DivideBy8 => 8,
            APBPrescaler::DivideBy16 => 16,
        }
    }
}

/// GPIO banks of the STM32F4 family. The gate table rejects the banks this
/// package does not bond out.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioBank {
    GPIOA,
    GPIOB,
    GPIOC,
    GPIOD,
    GPIOE,
    GPIOF,
    GPIOG,
    GPIOH,
}

/// USART instances wired on the STM32F401RE.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Usart {
    USART1,
    USART2,
    USART6,
}
