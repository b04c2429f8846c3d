// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2024.

pub mod clocks;
pub mod hsi;
pub mod pll;

pub use crate::clocks::clocks::{
    ClockDomain, Clocks, SequencerState, SystemClockConfig, SYS_CLOCK_84MHZ,
};
