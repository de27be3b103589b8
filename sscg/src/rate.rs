// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! PLL14xx rate tables and divider decoding.

use crate::engine::{Field, REFERENCE_HZ};

/// One supported PLL output rate and the dividers that produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pll14xxRate {
    /// Nominal output rate, Hz.
    pub rate: u64,
    /// Main (feedback) divider, `m`.
    pub mdiv: u32,
    /// Pre-divider, `p`.
    pub pdiv: u32,
    /// Post-divider exponent, `s`.
    pub sdiv: u32,
    /// Fractional divider, `k`. Always zero on 1416x PLLs.
    pub kdiv: i16,
}

impl Pll14xxRate {
    /// Define a table entry for a fractional (1443x) PLL.
    pub const fn new(rate: u64, mdiv: u32, pdiv: u32, sdiv: u32, kdiv: i16) -> Self {
        Self {
            rate,
            mdiv,
            pdiv,
            sdiv,
            kdiv,
        }
    }

    /// Define a table entry for an integer (1416x) PLL.
    pub const fn integer(rate: u64, mdiv: u32, pdiv: u32, sdiv: u32) -> Self {
        Self::new(rate, mdiv, pdiv, sdiv, 0)
    }

    /// Compute the rate these dividers produce from the reference clock.
    ///
    /// Returns `None` if `pdiv` is zero.
    pub fn output_rate(&self) -> Option<u64> {
        output_rate(self.mdiv, self.pdiv, self.sdiv, self.kdiv)
    }
}

/// `Fout = Fin * (m * 65536 + k) / (p * 2^s * 65536)`
fn output_rate(mdiv: u32, pdiv: u32, sdiv: u32, kdiv: i16) -> Option<u64> {
    if pdiv == 0 {
        return None;
    }
    let feedback = i64::from(mdiv) * 65536 + i64::from(kdiv);
    let feedback = u64::try_from(feedback).ok()?;
    let vco = (REFERENCE_HZ * feedback) / (u64::from(pdiv) * 65536);
    Some(vco >> sdiv)
}

/// Video PLL rates.
pub static VIDEO_PLL: &[Pll14xxRate] = &[
    Pll14xxRate::new(2_079_000_000, 173, 1, 1, 16384),
    Pll14xxRate::new(1_039_500_000, 173, 2, 1, 16384),
    Pll14xxRate::new(650_000_000, 325, 3, 2, 0),
    Pll14xxRate::new(594_000_000, 198, 2, 2, 0),
    Pll14xxRate::new(519_750_000, 173, 2, 2, 16384),
];

/// DRAM PLL rates.
pub static DRAM_PLL: &[Pll14xxRate] = &[Pll14xxRate::new(650_000_000, 325, 3, 2, 0)];

/// Audio PLL rates, shared by both audio PLLs.
pub static AUDIO_PLL: &[Pll14xxRate] = &[
    Pll14xxRate::new(393_216_000, 262, 2, 3, 9437),
    Pll14xxRate::new(361_267_200, 361, 3, 3, 17511),
];

/// Integer PLL rates used by the ARM, GPU, VPU, and system PLLs.
///
/// These PLLs can't modulate; the table is here for rate decoding.
pub static PLL1416X: &[Pll14xxRate] = &[
    Pll14xxRate::integer(1_800_000_000, 225, 3, 0),
    Pll14xxRate::integer(1_600_000_000, 200, 3, 0),
    Pll14xxRate::integer(1_200_000_000, 300, 3, 1),
    Pll14xxRate::integer(1_000_000_000, 250, 3, 1),
    Pll14xxRate::integer(800_000_000, 200, 3, 1),
    Pll14xxRate::integer(750_000_000, 250, 2, 2),
    Pll14xxRate::integer(700_000_000, 350, 3, 2),
    Pll14xxRate::integer(600_000_000, 300, 3, 2),
];

/// Find the table entry for exactly `rate`.
pub fn lookup_rate(table: &[Pll14xxRate], rate: u64) -> Option<&Pll14xxRate> {
    table.iter().find(|entry| entry.rate == rate)
}

/// `FDIV_CTL0` fields.
pub mod fdiv_ctl0 {
    use crate::engine::Field;

    /// `m`
    pub const PLL_MAIN_DIV: Field = Field::new(12, 10);
    /// `p`
    pub const PLL_PRE_DIV: Field = Field::new(4, 6);
    /// `s`
    pub const PLL_POST_DIV: Field = Field::new(0, 3);
}

/// `FDIV_CTL1` DSM field, the signed `k` divider.
const PLL_DSM: Field = Field::new(0, 16);

/// Dividers decoded from a PLL's `FDIV_CTL0` and `FDIV_CTL1` registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dividers {
    /// Main divider, `PLL_MAIN_DIV`.
    pub mdiv: u32,
    /// Pre-divider, `PLL_PRE_DIV`. Zero when the PLL isn't programmed.
    pub pdiv: u32,
    /// Post-divider exponent, `PLL_POST_DIV`.
    pub sdiv: u32,
    /// Fractional divider, `PLL_DSM`, sign extended.
    pub kdiv: i16,
}

impl Dividers {
    /// Decode the divider registers.
    pub const fn from_registers(ctl0: u32, ctl1: u32) -> Self {
        Self {
            mdiv: fdiv_ctl0::PLL_MAIN_DIV.get(ctl0),
            pdiv: fdiv_ctl0::PLL_PRE_DIV.get(ctl0),
            sdiv: fdiv_ctl0::PLL_POST_DIV.get(ctl0),
            kdiv: PLL_DSM.get(ctl1) as u16 as i16,
        }
    }

    /// The rate these dividers produce, or `None` if the PLL isn't
    /// programmed.
    pub fn output_rate(&self) -> Option<u64> {
        output_rate(self.mdiv, self.pdiv, self.sdiv, self.kdiv)
    }
}
