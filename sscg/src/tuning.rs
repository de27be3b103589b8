// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Live tuning of one PLL's spread-spectrum modulation.
//!
//! An [`Sscg`] owns the modulation parameters of a PLL together with
//! its `SSCG_CTRL` register. All access goes through one lock, so a
//! session can be shared between threads.
//!
//! `mf` and `mr` can only change while modulation is disabled. `pf`
//! can change at any time; it reaches the hardware on the next
//! enable.

use std::{
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{
    engine::{self, ControlWord, SpreadProfile},
    rate::{self, Pll14xxRate},
    register::ControlRegister,
    Error,
};

/// Initial modulation parameters, as a board would declare them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SscgConfig {
    mf: u32,
    mr: u32,
    pf: SpreadProfile,
}

impl SscgConfig {
    /// Validate the initial parameters.
    ///
    /// `mf` and `mr` must be nonzero. `pf` may be any of the three
    /// hardware profiles.
    pub fn new(mf: u32, mr: u32, pf: u32) -> Result<Self, Error> {
        let mf = nonzero("mf", mf)?;
        let mr = nonzero("mr", mr)?;
        let pf = SpreadProfile::from_bits(pf).ok_or(Error::InvalidInput {
            what: "pf",
            value: i64::from(pf),
        })?;
        Ok(Self { mf, mr, pf })
    }

    /// Modulation frequency, Hz.
    pub fn mf(&self) -> u32 {
        self.mf
    }

    /// Modulation rate, percent scaled by 100.
    pub fn mr(&self) -> u32 {
        self.mr
    }

    /// Modulation profile.
    pub fn pf(&self) -> SpreadProfile {
        self.pf
    }
}

fn nonzero(what: &'static str, value: u32) -> Result<u32, Error> {
    if value == 0 {
        Err(Error::InvalidInput { what, value: 0 })
    } else {
        Ok(value)
    }
}

/// A snapshot of a tuning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SscgState {
    /// Pre-divider of the current PLL rate.
    pub pdiv: u32,
    /// Main divider of the current PLL rate.
    pub mdiv: u32,
    /// Modulation frequency, Hz.
    pub mf: u32,
    /// Modulation rate, percent scaled by 100.
    pub mr: u32,
    /// Modulation profile.
    pub pf: SpreadProfile,
    /// Derived from `mf` and `pdiv`.
    pub mfr: u8,
    /// Derived from `mr`, `mdiv`, and `mfr`.
    pub mrr: u8,
    /// Whether the generator is enabled in hardware.
    pub enabled: bool,
}

impl SscgState {
    fn new(config: SscgConfig, rate: &Pll14xxRate) -> Self {
        let mut state = Self {
            pdiv: rate.pdiv,
            mdiv: rate.mdiv,
            mf: config.mf,
            mr: config.mr,
            pf: config.pf,
            mfr: 0,
            mrr: 0,
            enabled: false,
        };
        state.derive(config.mf, config.mr);
        state
    }

    /// Store a new `(mf, mr)` pair with the register fields it implies.
    fn derive(&mut self, mf: u32, mr: u32) {
        let mfr = engine::compute_mfr(mf, self.pdiv);
        let mrr = engine::compute_mrr(mr, self.mdiv, mfr);
        self.mf = mf;
        self.mr = mr;
        self.mfr = mfr;
        self.mrr = mrr;
    }

    /// The register value for the stored fields, without the enable bit.
    pub fn control_word(&self) -> ControlWord {
        ControlWord::assemble(self.mfr, self.mrr, self.pf)
    }
}

/// A named, text-based view of one tuning parameter.
///
/// Reads produce a decimal integer and a newline. Writes take one
/// integer with an optional sign, surrounded by optional whitespace.
/// Like the kernel's `kstrtoint` with base 0, a `0x` prefix selects
/// hexadecimal, a leading `0` selects octal, and anything else is
/// decimal. Text that doesn't parse is rejected before anything
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Endpoint {
    /// Modulation frequency.
    Mf,
    /// Modulation rate.
    Mr,
    /// Modulation profile.
    Pf,
    /// Generator enable, 0 or 1.
    Enable,
}

impl Endpoint {
    /// Every endpoint, in display order.
    pub const ALL: [Endpoint; 4] = [Self::Mf, Self::Mr, Self::Pf, Self::Enable];

    /// The short name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mf => "mf",
            Self::Mr => "mr",
            Self::Pf => "pf",
            Self::Enable => "enable",
        }
    }

    /// The long name, as debug file systems show it.
    pub const fn long_name(self) -> &'static str {
        match self {
            Self::Mf => "module-frequency",
            Self::Mr => "module-rate",
            Self::Pf => "profile_sel",
            Self::Enable => "enable",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|endpoint| endpoint.name() == name || endpoint.long_name() == name)
            .ok_or_else(|| Error::UnknownEndpoint(s.into()))
    }
}

/// A spread-spectrum tuning session for one PLL.
pub struct Sscg<R> {
    inner: Mutex<Inner<R>>,
}

struct Inner<R> {
    state: SscgState,
    register: R,
}

impl<R: ControlRegister> Inner<R> {
    /// Program the register from the stored fields.
    ///
    /// Enabling takes two writes: the hardware wants the fields to
    /// land before the generator is gated on.
    fn program(&mut self, enable: bool) -> Result<(), Error> {
        let word = self.state.control_word();
        if enable {
            self.register.write(word.raw())?;
            self.register.write(word.enable().raw())?;
        } else {
            self.register.write(word.disable().raw())?;
        }
        self.state.enabled = enable;
        Ok(())
    }

    fn ensure_disabled(&self, what: &'static str) -> Result<(), Error> {
        if self.state.enabled {
            tracing::warn!("please disable sscg before changing {what}");
            Err(Error::Busy(what))
        } else {
            Ok(())
        }
    }
}

impl<R: ControlRegister> Sscg<R> {
    /// Bring up modulation on a PLL running at `rate`.
    ///
    /// `rate` must exactly match an entry of `rates`; that entry
    /// supplies the dividers, which must be nonzero. On success,
    /// modulation is enabled. On failure, nothing is written.
    pub fn bring_up(
        config: SscgConfig,
        rates: &[Pll14xxRate],
        rate: u64,
        register: R,
    ) -> Result<Self, Error> {
        let entry = rate::lookup_rate(rates, rate).ok_or(Error::UnknownRate { rate })?;
        nonzero("mdiv", entry.mdiv)?;
        nonzero("pdiv", entry.pdiv)?;
        let mut inner = Inner {
            state: SscgState::new(config, entry),
            register,
        };
        inner.program(true)?;

        let state = &inner.state;
        tracing::info!(mf = state.mf, mr = state.mr, pf = %state.pf, "sscg enabled");
        tracing::info!(mfr = state.mfr, mrr = state.mrr, "sscg fields");

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        // State only changes after register writes succeed, so it's
        // consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of the session.
    pub fn state(&self) -> SscgState {
        self.lock().state
    }

    /// Returns the modulation frequency.
    pub fn mf(&self) -> u32 {
        self.lock().state.mf
    }

    /// Returns the modulation rate.
    pub fn mr(&self) -> u32 {
        self.lock().state.mr
    }

    /// Returns the modulation profile.
    pub fn pf(&self) -> SpreadProfile {
        self.lock().state.pf
    }

    /// Returns whether the generator is enabled.
    pub fn is_enabled(&self) -> bool {
        self.lock().state.enabled
    }

    /// Change the modulation frequency.
    ///
    /// Fails with [`Error::Busy`] while modulation is enabled. The
    /// register isn't written; the new fields land on the next enable.
    pub fn set_mf(&self, mf: u32) -> Result<(), Error> {
        let mf = nonzero("mf", mf)?;
        let mut inner = self.lock();
        inner.ensure_disabled("mf")?;
        let mr = inner.state.mr;
        inner.state.derive(mf, mr);
        tracing::debug!(mf, mfr = inner.state.mfr, mrr = inner.state.mrr, "set mf");
        Ok(())
    }

    /// Change the modulation rate.
    ///
    /// Same rules as [`set_mf`](Self::set_mf).
    pub fn set_mr(&self, mr: u32) -> Result<(), Error> {
        let mr = nonzero("mr", mr)?;
        let mut inner = self.lock();
        inner.ensure_disabled("mr")?;
        let mf = inner.state.mf;
        inner.state.derive(mf, mr);
        tracing::debug!(mr, mrr = inner.state.mrr, "set mr");
        Ok(())
    }

    /// Change the modulation profile. Allowed in any state.
    pub fn set_pf(&self, pf: SpreadProfile) {
        self.lock().state.pf = pf;
        tracing::debug!(%pf, "set pf");
    }

    /// Enable or disable the generator.
    ///
    /// If the register write fails, the enable state is unchanged.
    pub fn set_enabled(&self, enable: bool) -> Result<(), Error> {
        self.lock().program(enable)
    }

    /// Read an endpoint as text.
    pub fn read_endpoint(&self, endpoint: Endpoint) -> String {
        let state = self.state();
        let value = match endpoint {
            Endpoint::Mf => state.mf,
            Endpoint::Mr => state.mr,
            Endpoint::Pf => state.pf.bits(),
            Endpoint::Enable => u32::from(state.enabled),
        };
        format!("{value}\n")
    }

    /// Write an endpoint from text.
    ///
    /// Nothing changes if the text or the value is invalid. The `pf`
    /// endpoint only takes the down- and up-spread profiles; use
    /// [`set_pf`](Self::set_pf) for center-spread.
    pub fn write_endpoint(&self, endpoint: Endpoint, text: &str) -> Result<(), Error> {
        let value = parse_integer(text)?;
        match endpoint {
            Endpoint::Mf => self.set_mf(to_u32("mf", value)?),
            Endpoint::Mr => self.set_mr(to_u32("mr", value)?),
            Endpoint::Pf => {
                let pf = match value {
                    0 => SpreadProfile::Down,
                    1 => SpreadProfile::Up,
                    _ => return Err(Error::InvalidInput { what: "pf", value }),
                };
                self.set_pf(pf);
                Ok(())
            }
            Endpoint::Enable => {
                if value < 0 {
                    return Err(Error::InvalidInput {
                        what: "enable",
                        value,
                    });
                }
                self.set_enabled(value != 0)
            }
        }
    }

    /// Run `f` with the register, under the session lock.
    pub fn with_register<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.lock().register)
    }

    /// End the session, returning the register.
    pub fn into_register(self) -> R {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .register
    }
}

impl<R> fmt::Debug for Sscg<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(inner) => f.debug_struct("Sscg").field("state", &inner.state).finish(),
            Err(_) => f.debug_struct("Sscg").finish_non_exhaustive(),
        }
    }
}

fn to_u32(what: &'static str, value: i64) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::InvalidInput { what, value })
}

/// Parse one integer from endpoint text.
///
/// The radix follows the prefix: `0x` is hexadecimal, a leading `0`
/// is octal, and anything else is decimal. One sign may precede the
/// prefix; none may follow it.
fn parse_integer(text: &str) -> Result<i64, Error> {
    let parse_error = || Error::Parse { text: text.into() };

    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(unsigned) => (true, unsigned),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (radix, digits) = if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };

    // from_str_radix takes its own sign; only digits may follow the prefix.
    if !digits.starts_with(|c: char| c.is_digit(radix)) {
        return Err(parse_error());
    }
    let magnitude = i128::from(u64::from_str_radix(digits, radix).map_err(|_| parse_error())?);
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| parse_error())
}
