// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Spread-spectrum modulation arithmetic for PLL14xx.
//!
//! The PLL's `SSCG_CTRL` register takes two derived fields, `MFREQ_CTL`
//! (mfr) and `MRAT_CTL` (mrr). The reference manual relates them to
//! the modulation frequency and rate:
//!
//! ```text
//! MF = Fin / p / mfr / 2^5          [Hz]
//! MR = mfr * mrr / m / 2^6 * 100    [%]
//! ```
//!
//! Users think in `mf` (Hz) and `mr` (percent, scaled by 100), so
//! this module solves for `mfr` and `mrr`.

use std::fmt;

/// PLL input frequency, from the board's 24MHz oscillator.
pub const REFERENCE_HZ: u64 = 24_000_000;

/// `mrr` is computed from `mr` scaled by this much.
const MR_SCALE: u64 = 10_000;

/// Largest value of `MFREQ_CTL`.
pub const MFR_MAX: u8 = 0xFF;

/// Largest value of `MRAT_CTL`.
pub const MRR_MAX: u8 = 0x3F;

/// Integer division that rounds half away from zero.
///
/// Operands are unsigned, so this is round-half-up. A numerator at
/// the top of the range saturates instead of wrapping.
const fn div_round_closest(numerator: u64, denominator: u64) -> u64 {
    numerator.saturating_add(denominator / 2) / denominator
}

/// Compute the modulation frequency ratio `mfr` from `mf` and `pdiv`.
///
/// `mf` and `pdiv` must be nonzero; callers validate them. The result
/// is clamped into `1..=255`. Clamping is logged, but it isn't an error.
///
/// # Panics
///
/// Panics if `mf` or `pdiv` is zero.
pub fn compute_mfr(mf: u32, pdiv: u32) -> u8 {
    assert!(mf != 0, "mf must be validated before computing mfr");
    assert!(pdiv != 0, "pdiv must be validated before computing mfr");

    let denominator = (u64::from(mf) << 5).saturating_mul(u64::from(pdiv));
    let mfr = div_round_closest(REFERENCE_HZ, denominator);

    if mfr > u64::from(MFR_MAX) {
        tracing::warn!(mfr, "mfr overflow, change to {MFR_MAX}");
        MFR_MAX
    } else if mfr == 0 {
        tracing::warn!(mf, pdiv, "mfr underflow, change to 1");
        1
    } else {
        mfr as u8
    }
}

/// The rounded `mr * m * 2^6 / mfr`, before removing the `mr` scale.
///
/// [`compute_mrr`] divides this by 10000. It's exposed for logging and
/// for tools that want to show how close `mrr` came to its limit.
pub fn mrr_unscaled(mr: u32, mdiv: u32, mfr: u8) -> u64 {
    assert!(mfr != 0, "mfr is never zero");
    let numerator = u64::from(mr).saturating_mul(u64::from(mdiv) << 6);
    div_round_closest(numerator, u64::from(mfr))
}

/// Compute the modulation rate ratio `mrr` from `mr`, `mdiv`, and `mfr`.
///
/// `mfr` must be the value [`compute_mfr`] returned for the same PLL
/// configuration. The result is clamped into `0..=63`.
pub fn compute_mrr(mr: u32, mdiv: u32, mfr: u8) -> u8 {
    debug_assert!(mr != 0, "mr must be validated before computing mrr");

    let raw = mrr_unscaled(mr, mdiv, mfr);
    tracing::trace!(raw, "unscaled mrr");

    let mrr = div_round_closest(raw, MR_SCALE);
    if mrr > u64::from(MRR_MAX) {
        tracing::warn!(mrr, "mrr overflow, change to {MRR_MAX}");
        MRR_MAX
    } else {
        mrr as u8
    }
}

/// The direction of the frequency spread.
///
/// The discriminants are the `SEL_PF` encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SpreadProfile {
    /// Spread below the nominal frequency.
    #[default]
    Down = 0,
    /// Spread above the nominal frequency.
    Up = 1,
    /// Spread around the nominal frequency.
    Center = 2,
}

impl SpreadProfile {
    /// Decode a `SEL_PF` value.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Down),
            1 => Some(Self::Up),
            2 => Some(Self::Center),
            _ => None,
        }
    }

    /// Returns the `SEL_PF` encoding.
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for SpreadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Down => "down-spread",
            Self::Up => "up-spread",
            Self::Center => "center-spread",
        };
        f.write_str(name)
    }
}

/// A bit field within a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    offset: u32,
    width: u32,
}

impl Field {
    /// Define a field of `width` bits starting at bit `offset`.
    pub const fn new(offset: u32, width: u32) -> Self {
        Self { offset, width }
    }

    /// The unshifted mask.
    pub const fn mask(self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Extract this field from `word`.
    pub const fn get(self, word: u32) -> u32 {
        (word >> self.offset) & self.mask()
    }

    /// Replace this field in `word` with `value`.
    ///
    /// Bits of `value` beyond the field width are dropped.
    pub const fn set(self, word: u32, value: u32) -> u32 {
        let mask = self.mask() << self.offset;
        (word & !mask) | ((value << self.offset) & mask)
    }
}

/// `SSCG_CTRL` field layout.
pub mod sscg_ctrl {
    use super::Field;

    /// Spread-spectrum generator enable.
    pub const SSCG_EN: Field = Field::new(31, 1);
    /// Modulation frequency control, `mfr`.
    pub const PLL_MFREQ_CTL: Field = Field::new(12, 8);
    /// Modulation rate control, `mrr`.
    pub const PLL_MRAT_CTL: Field = Field::new(4, 6);
    /// Modulation profile select.
    pub const SEL_PF: Field = Field::new(0, 2);
}

/// A value for the `SSCG_CTRL` register.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ControlWord(u32);

impl ControlWord {
    /// Pack the modulation fields. The enable bit is clear.
    pub const fn assemble(mfr: u8, mrr: u8, pf: SpreadProfile) -> Self {
        let word = sscg_ctrl::PLL_MFREQ_CTL.set(0, mfr as u32);
        let word = sscg_ctrl::PLL_MRAT_CTL.set(word, mrr as u32);
        Self(sscg_ctrl::SEL_PF.set(word, pf.bits()))
    }

    /// Wrap a raw register value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw register value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The same word with the generator enabled.
    pub const fn enable(self) -> Self {
        Self(sscg_ctrl::SSCG_EN.set(self.0, 1))
    }

    /// The same word with the generator disabled.
    pub const fn disable(self) -> Self {
        Self(sscg_ctrl::SSCG_EN.set(self.0, 0))
    }

    /// Whether `SSCG_EN` is set.
    pub const fn is_enabled(self) -> bool {
        sscg_ctrl::SSCG_EN.get(self.0) != 0
    }

    /// The `MFREQ_CTL` field.
    pub const fn mfr(self) -> u8 {
        sscg_ctrl::PLL_MFREQ_CTL.get(self.0) as u8
    }

    /// The `MRAT_CTL` field.
    pub const fn mrr(self) -> u8 {
        sscg_ctrl::PLL_MRAT_CTL.get(self.0) as u8
    }

    /// Returns `None` for the reserved `SEL_PF` encoding.
    pub const fn profile(self) -> Option<SpreadProfile> {
        SpreadProfile::from_bits(sscg_ctrl::SEL_PF.get(self.0))
    }
}

impl fmt::Debug for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlWord({:#010x})", self.0)
    }
}

impl fmt::LowerHex for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfr_rounds_to_nearest() {
        // 24MHz / (16384 * 32) = 45.78
        assert_eq!(compute_mfr(16384, 1), 46);
        // 24MHz / (30000 * 32 * 2) = 12.5, ties round up.
        assert_eq!(compute_mfr(30000, 2), 13);
    }

    #[test]
    fn mfr_clamps_high_to_255() {
        // 24MHz / (100 * 32 * 3) = 2500
        assert_eq!(compute_mfr(100, 3), MFR_MAX);
        assert_eq!(compute_mfr(1, 1), MFR_MAX);
    }

    #[test]
    fn mfr_never_rounds_to_zero() {
        assert_eq!(compute_mfr(2_000_000, 1), 1);
        assert_eq!(compute_mfr(u32::MAX, 3), 1);
    }

    #[test]
    fn extreme_inputs_clamp_instead_of_overflowing() {
        assert_eq!(compute_mfr(u32::MAX, u32::MAX), 1);
        assert_eq!(mrr_unscaled(u32::MAX, u32::MAX, 1), u64::MAX);
        assert_eq!(compute_mrr(u32::MAX, u32::MAX, 1), MRR_MAX);
    }

    #[test]
    #[should_panic(expected = "pdiv must be validated")]
    fn zero_pdiv_is_rejected() {
        compute_mfr(1, 0);
    }

    #[test]
    fn mrr_rounds_twice() {
        // 100 * (198 << 6) / 13 = 97476.9 -> 97477
        assert_eq!(mrr_unscaled(100, 198, 13), 97_477);
        // 97477 / 10000 = 9.7 -> 10
        assert_eq!(compute_mrr(100, 198, 13), 10);
    }

    #[test]
    fn mrr_clamps_to_63() {
        assert_eq!(compute_mrr(10_000, 198, 13), MRR_MAX);
    }

    #[test]
    fn mrr_can_be_zero() {
        // 50 * (325 << 6) / 255 = 4078.4 -> 4078, then 0.4078 -> 0
        assert_eq!(mrr_unscaled(50, 325, 255), 4078);
        assert_eq!(compute_mrr(50, 325, 255), 0);
    }

    #[test]
    #[should_panic(expected = "mfr is never zero")]
    fn zero_mfr_is_an_invariant_violation() {
        mrr_unscaled(1, 1, 0);
    }

    #[test]
    fn assemble_places_fields() {
        let word = ControlWord::assemble(13, 10, SpreadProfile::Up);
        assert_eq!(word.raw(), 0x0000_d0a1);
        assert_eq!(word.mfr(), 13);
        assert_eq!(word.mrr(), 10);
        assert_eq!(word.profile(), Some(SpreadProfile::Up));
        assert!(!word.is_enabled());
    }

    #[test]
    fn enable_and_disable_touch_only_bit_31() {
        let word = ControlWord::assemble(255, 63, SpreadProfile::Center);
        assert_eq!(word.enable().raw(), 0x800f_f3f2);
        assert_eq!(word.enable().disable(), word);
        assert_eq!(word.disable(), word);
        assert!(word.enable().is_enabled());
    }

    #[test]
    fn field_set_drops_extra_bits() {
        let field = Field::new(4, 6);
        assert_eq!(field.set(0, 0xFF), 0x3F << 4);
        assert_eq!(field.set(u32::MAX, 0), !(0x3F << 4));
    }

    #[test]
    fn reserved_profile_decodes_to_none() {
        assert_eq!(ControlWord::from_raw(3).profile(), None);
        assert_eq!(SpreadProfile::from_bits(2), Some(SpreadProfile::Center));
    }
}
