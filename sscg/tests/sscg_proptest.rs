// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Property tests for the modulation arithmetic and tuning rules.

use sscg::{
    engine::{compute_mfr, compute_mrr, mrr_unscaled, ControlWord, SpreadProfile, REFERENCE_HZ},
    rate::VIDEO_PLL,
    Endpoint, MemoryRegister, Sscg, SscgConfig,
};

fn expected_mfr(mf: u32, pdiv: u32) -> u64 {
    let denominator = (u64::from(mf) << 5) * u64::from(pdiv);
    let rounded = (REFERENCE_HZ as f64 / denominator as f64).round() as u64;
    rounded.clamp(1, 255)
}

fn profile() -> impl proptest::strategy::Strategy<Value = SpreadProfile> {
    proptest::prop_oneof![
        proptest::strategy::Just(SpreadProfile::Down),
        proptest::strategy::Just(SpreadProfile::Up),
        proptest::strategy::Just(SpreadProfile::Center),
    ]
}

proptest::proptest! {
    /// mfr follows the rounded formula and stays in 1..=255.
    #[test]
    fn mfr_matches_formula(mf in 1u32..=2000, pdiv in 1u32..=3) {
        let mfr = compute_mfr(mf, pdiv);
        assert!((1..=255).contains(&mfr));
        assert_eq!(u64::from(mfr), expected_mfr(mf, pdiv));
    }

    /// mfr never wraps, no matter how large or small mf gets.
    #[test]
    fn mfr_stays_in_range(mf in 1u32..=u32::MAX, pdiv in 1u32..=u32::MAX) {
        let mfr = compute_mfr(mf, pdiv);
        assert!(mfr >= 1);
    }

    /// mrr stays in 0..=63 for any nonzero mfr and any divider.
    #[test]
    fn mrr_stays_in_range(mr in 1u32..=u32::MAX, mdiv in 1u32..=u32::MAX, mfr in 1u8..=255) {
        assert!(compute_mrr(mr, mdiv, mfr) <= 63);
    }

    /// Below the clamp, mrr is the rounded unscaled value over 10000.
    #[test]
    fn mrr_rounds_unscaled(mr in 1u32..=10_000, mdiv in 1u32..=1023, mfr in 1u8..=255) {
        let raw = mrr_unscaled(mr, mdiv, mfr);
        let expected = ((raw + 5_000) / 10_000).min(63);
        assert_eq!(u64::from(compute_mrr(mr, mdiv, mfr)), expected);
    }

    /// Assembled words decode back to their fields.
    #[test]
    fn assembled_fields_decode(mfr in 0u8..=255, mrr in 0u8..=63, pf in profile()) {
        let word = ControlWord::assemble(mfr, mrr, pf);
        assert_eq!(word.mfr(), mfr);
        assert_eq!(word.mrr(), mrr);
        assert_eq!(word.profile(), Some(pf));
        assert!(!word.is_enabled());
        assert_eq!(word.enable().disable(), word);
    }

    /// Changing mf or mr while enabled leaves the session untouched.
    #[test]
    fn enabled_session_rejects_retuning(mf in 1u32..=100_000, mr in 1u32..=10_000) {
        let config = SscgConfig::new(30_000, 100, 0).unwrap();
        let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, MemoryRegister::default()).unwrap();
        let before = sscg.state();
        assert!(sscg.set_mf(mf).is_err());
        assert!(sscg.set_mr(mr).is_err());
        assert_eq!(sscg.state(), before);
    }

    /// Endpoint reads return what was written.
    #[test]
    fn endpoint_text_round_trips(mf in 1u32..=u32::MAX) {
        let config = SscgConfig::new(30_000, 100, 0).unwrap();
        let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, MemoryRegister::default()).unwrap();
        sscg.set_enabled(false).unwrap();
        sscg.write_endpoint(Endpoint::Mf, &format!("{mf}\n")).unwrap();
        assert_eq!(sscg.read_endpoint(Endpoint::Mf), format!("{mf}\n"));
    }
}
