// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Tuning sessions driven the way the command line tool drives them.

use sscg::{
    engine::{compute_mfr, compute_mrr},
    rate::{DRAM_PLL, VIDEO_PLL},
    ControlRegister, Endpoint, Error, MemoryRegister, SpreadProfile, Sscg, SscgConfig,
};

#[test]
fn dram_pll_650mhz_bring_up() {
    let config = SscgConfig::new(100, 50, 0).unwrap();
    let sscg = Sscg::bring_up(config, DRAM_PLL, 650_000_000, MemoryRegister::default()).unwrap();

    let state = sscg.state();
    assert_eq!((state.mdiv, state.pdiv), (325, 3));
    // 24MHz / (100 * 32 * 3) = 2500, clamped.
    assert_eq!(state.mfr, 255);
    // 50 * (325 << 6) / 255 = 4078, then 4078 / 10000 = 0.
    assert_eq!(state.mrr, 0);
    assert_eq!(sscg.into_register().writes(), &[0x000f_f000, 0x800f_f000]);
}

#[test]
fn retune_a_running_pll() {
    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, MemoryRegister::default()).unwrap();

    for (endpoint, text) in [
        ("enable", "0"),
        ("module-frequency", "15000"),
        ("mr", "50"),
        ("profile_sel", "1"),
        ("enable", "1"),
    ] {
        let endpoint: Endpoint = endpoint.parse().unwrap();
        sscg.write_endpoint(endpoint, text).unwrap();
    }

    let state = sscg.state();
    assert_eq!(state.mfr, compute_mfr(15_000, 2));
    assert_eq!(state.mrr, compute_mrr(50, 198, state.mfr));
    assert_eq!(state.pf, SpreadProfile::Up);

    let writes = sscg.into_register().writes().to_vec();
    let word = sscg::ControlWord::assemble(state.mfr, state.mrr, SpreadProfile::Up);
    assert_eq!(
        writes,
        vec![
            0x0000_d0a0,
            0x8000_d0a0,
            0x0000_d0a0,
            word.raw(),
            word.enable().raw()
        ]
    );
}

#[test]
fn enable_disable_round_trip_keeps_fields() {
    let config = SscgConfig::new(16_384, 300, 2).unwrap();
    let sscg = Sscg::bring_up(config, VIDEO_PLL, 2_079_000_000, MemoryRegister::default()).unwrap();
    let at_enable = sscg.with_register(|reg| reg.value());

    let _ = sscg.read_endpoint(Endpoint::Mf);
    let _ = sscg.state();
    sscg.set_enabled(false).unwrap();

    let after = sscg.with_register(|reg| reg.value());
    assert_eq!(after & !(1 << 31), at_enable & !(1 << 31));
    assert_eq!(at_enable & (1 << 31), 1 << 31);
    assert_eq!(after & (1 << 31), 0);
}

#[test]
fn busy_writes_leave_state_alone() {
    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, MemoryRegister::default()).unwrap();
    let before = sscg.state();

    let err = sscg.write_endpoint(Endpoint::Mf, "40000").unwrap_err();
    assert!(matches!(err, Error::Busy("mf")));
    assert!(err.to_string().contains("disable it before changing mf"));
    assert!(matches!(
        sscg.write_endpoint(Endpoint::Mr, "1"),
        Err(Error::Busy("mr"))
    ));
    assert_eq!(sscg.state(), before);
}

#[test]
fn set_pf_twice_is_idempotent() {
    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, MemoryRegister::default()).unwrap();
    sscg.set_pf(SpreadProfile::Up);
    let once = sscg.state();
    sscg.set_pf(SpreadProfile::Up);
    assert_eq!(sscg.state(), once);
}

/// Fails every write after the first `budget` writes.
struct FlakyRegister {
    inner: MemoryRegister,
    budget: usize,
}

impl ControlRegister for FlakyRegister {
    fn read(&mut self) -> Result<u32, Error> {
        self.inner.read()
    }
    fn write(&mut self, value: u32) -> Result<(), Error> {
        if self.budget == 0 {
            return Err(Error::Io {
                what: "writing the register",
                source: "bus fault".into(),
            });
        }
        self.budget -= 1;
        self.inner.write(value)
    }
}

#[test]
fn io_failure_keeps_enable_state() {
    let register = FlakyRegister {
        inner: MemoryRegister::default(),
        budget: 3,
    };
    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, register).unwrap();

    // One write left: disabling uses it, so enabling fails.
    sscg.set_enabled(false).unwrap();
    let err = sscg.set_enabled(true).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(!sscg.is_enabled());
}

#[test]
fn bring_up_fails_without_writing() {
    let register = FlakyRegister {
        inner: MemoryRegister::default(),
        budget: 0,
    };
    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    assert!(matches!(
        Sscg::bring_up(config, VIDEO_PLL, 594_000_000, register),
        Err(Error::Io { .. })
    ));

    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    let err = Sscg::bring_up(config, DRAM_PLL, 594_000_000, MemoryRegister::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "594000000 Hz isn't in the PLL's rate table");
}

#[test]
fn concurrent_writers_keep_fields_consistent() {
    let config = SscgConfig::new(30_000, 100, 0).unwrap();
    let sscg = Sscg::bring_up(config, VIDEO_PLL, 594_000_000, MemoryRegister::default()).unwrap();
    sscg.set_enabled(false).unwrap();

    std::thread::scope(|scope| {
        for thread in 1..=4u32 {
            let sscg = &sscg;
            scope.spawn(move || {
                for step in 1..=50u32 {
                    let _ = sscg.set_mf(thread * 1_000 + step);
                    let _ = sscg.set_mr(thread * 10 + step);
                    let _ = sscg.read_endpoint(Endpoint::Mf);
                }
            });
        }
    });

    let state = sscg.state();
    assert_eq!(state.mfr, compute_mfr(state.mf, state.pdiv));
    assert_eq!(state.mrr, compute_mrr(state.mr, state.mdiv, state.mfr));
}
