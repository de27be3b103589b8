// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Tune spread-spectrum modulation on i.MX 8M Plus PLLs.
//!
//! The 1443x PLLs (audio, video, and DRAM) can dither their output
//! to reduce peak emissions. Use this library to compute the
//! `SSCG_CTRL` fields from user-facing modulation parameters, and to
//! drive the register through a debug probe. If you're looking for
//! the command line tool, that's provided in a separate package.
//!
//! The pieces are
//!
//! - [`engine`], the arithmetic and the register format.
//! - [`rate`], the PLL rate tables.
//! - [`tuning`], a lock-protected tuning session for one PLL.
//! - [`gate`], clock gates shared by sibling clocks.
//! - [`register`], the register access used by all of the above.

pub mod engine;
pub mod gate;
pub mod rate;
pub mod register;
pub mod tuning;

use probe_rs::MemoryInterface;
use std::{collections::BTreeMap, sync::LazyLock};

pub use engine::{compute_mfr, compute_mrr, ControlWord, SpreadProfile};
pub use rate::Pll14xxRate;
pub use register::{ControlRegister, MemoryRegister, ProbeRegister};
pub use tuning::{Endpoint, Sscg, SscgConfig, SscgState};

/// A PLL that supports spread-spectrum modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SscgPll {
    block_offset: u64,
    rates: &'static [Pll14xxRate],
}

impl SscgPll {
    /// Define a new PLL.
    ///
    /// `block_offset` is the offset of the PLL's `GEN_CTRL` register
    /// from the ANATOP base.
    pub const fn new(block_offset: u64, rates: &'static [Pll14xxRate]) -> Self {
        Self {
            block_offset,
            rates,
        }
    }

    /// Returns the PLL's rate table.
    pub const fn rates(&self) -> &'static [Pll14xxRate] {
        self.rates
    }
}

/// A collection of PLLs, named as in the clock tree.
pub type SscgPlls = BTreeMap<String, SscgPll>;

/// A valid PLL name.
///
/// If you obtain one of these, you can infallibly retrieve the PLL
/// using [`get`](Imx8mp::get).
#[derive(Debug, Clone, Copy)]
pub struct PllName<'a>(&'a String);

impl std::fmt::Display for PllName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An i.MX 8M Plus SoC.
///
/// Exposed as the [`IMX8MP`] `static`. Use it to find PLLs and
/// their registers.
pub struct Imx8mp {
    /// Starting address of the ANATOP block, which holds the PLLs.
    anatop: u64,
    /// Starting address of the CCM block, which holds the gates.
    ccm: u64,
    plls: SscgPlls,
}

impl Imx8mp {
    /// Returns the collection of all PLL names.
    pub fn all_pll_names(&self) -> impl Iterator<Item = PllName<'_>> {
        self.plls.keys().map(PllName)
    }

    /// Try to normalize the name, returning a key if known.
    ///
    /// Names are case insensitive, and the `_pll` / `_pll1` suffixes
    /// may be dropped.
    pub fn lookup_pll(&self, name: &str) -> Option<PllName<'_>> {
        let name = name.to_lowercase();

        if let Some((key, _)) = self.plls.get_key_value(&name) {
            return Some(PllName(key));
        }

        ["_pll", "_pll1"].into_iter().find_map(|suffix| {
            self.plls
                .get_key_value(&format!("{name}{suffix}"))
                .map(|(key, _)| PllName(key))
        })
    }

    /// Returns the PLL behind a name.
    pub fn get(&self, name: PllName) -> &SscgPll {
        self.plls
            .get(name.0.as_str())
            .expect("All PllNames are valid")
    }

    /// Returns the address of a PLL's `SSCG_CTRL` register.
    pub fn sscg_ctrl(&self, name: PllName) -> u64 {
        PllBlock::for_pll(self.anatop, self.get(name)).sscg_ctrl()
    }

    /// Returns the address of a CCM register.
    pub fn ccm_register(&self, offset: u64) -> u64 {
        self.ccm + offset
    }

    /// Read the PLL's dividers and compute its current rate.
    ///
    /// Returns `Ok(None)` if the dividers don't describe a rate.
    pub fn read_rate(
        &self,
        name: PllName,
        mem: &mut dyn MemoryInterface,
    ) -> Result<Option<u64>, Error> {
        let block = PllBlock::for_pll(self.anatop, self.get(name));
        let fdiv_ctl0 = mem
            .read_word_32(block.fdiv_ctl0())
            .map_err(context("reading FDIV_CTL0"))?;
        let fdiv_ctl1 = mem
            .read_word_32(block.fdiv_ctl1())
            .map_err(context("reading FDIV_CTL1"))?;

        let dividers = rate::Dividers::from_registers(fdiv_ctl0, fdiv_ctl1);
        tracing::debug!(pll = %name, ?dividers, "read PLL dividers");
        Ok(dividers.output_rate())
    }

    /// Access a PLL's `SSCG_CTRL` register through `mem`.
    pub fn sscg_register<'a>(
        &self,
        name: PllName,
        mem: &'a mut dyn MemoryInterface,
    ) -> ProbeRegister<'a> {
        ProbeRegister::new(mem, self.sscg_ctrl(name))
    }
}

fn pll(name: &'static str, block_offset: u64, rates: &'static [Pll14xxRate]) -> (String, SscgPll) {
    (name.into(), SscgPll::new(block_offset, rates))
}

/// Provides access to the PLLs on the i.MX 8M Plus.
///
/// See [`Imx8mp`] for more information.
pub static IMX8MP: LazyLock<Imx8mp> = LazyLock::new(|| {
    let plls = vec![
        pll("audio_pll1", 0x00, rate::AUDIO_PLL),
        pll("audio_pll2", 0x14, rate::AUDIO_PLL),
        pll("video_pll1", 0x28, rate::VIDEO_PLL),
        pll("dram_pll", 0x50, rate::DRAM_PLL),
    ]
    .into_iter()
    .collect();

    Imx8mp {
        anatop: 0x3036_0000,
        ccm: 0x3038_0000,
        plls,
    }
});

/// The registers of a 1443x PLL block.
#[derive(Debug, Clone, Copy)]
struct PllBlock(u64);

impl PllBlock {
    fn for_pll(anatop: u64, pll: &SscgPll) -> Self {
        Self(anatop + pll.block_offset)
    }
    fn fdiv_ctl0(self) -> u64 {
        self.0 + 0x4
    }
    fn fdiv_ctl1(self) -> u64 {
        self.0 + 0x8
    }
    fn sscg_ctrl(self) -> u64 {
        self.0 + 0xC
    }
}

/// Errors from tuning and register access.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value is out of range for what it configures.
    #[error("invalid {what}: {value}")]
    InvalidInput { what: &'static str, value: i64 },
    /// Text written to an endpoint isn't an integer.
    #[error("cannot parse {text:?} as an integer")]
    Parse { text: String },
    /// The change needs modulation to be disabled first.
    #[error("spread-spectrum modulation is enabled; disable it before changing {0}")]
    Busy(&'static str),
    /// The PLL runs at a rate that isn't in its table.
    #[error("{rate} Hz isn't in the PLL's rate table")]
    UnknownRate { rate: u64 },
    /// No tuning endpoint has this name.
    #[error("unknown tuning endpoint {0:?}")]
    UnknownEndpoint(String),
    /// The register access failed.
    #[error("{what}")]
    Io {
        what: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn context<E: std::error::Error + Send + Sync + 'static>(
    what: &'static str,
) -> impl FnOnce(E) -> Error {
    move |source| Error::Io {
        what,
        source: Box::new(source),
    }
}
