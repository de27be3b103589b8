// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Clock gates shared by sibling clocks.
//!
//! Some CCM gate fields feed more than one leaf clock. The field must
//! stay on while any leaf is enabled, so the leaves share a counter:
//! the first enable turns the field on, and the last disable turns
//! it off.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use crate::{engine::Field, register::ControlRegister, Error};

/// Field value that keeps a clock on in all power modes.
const NEEDED_ALL_MODES: u32 = 0b11;

/// A CCGR gate field that several leaf clocks share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedGateField {
    /// Short name, for display.
    pub name: &'static str,
    /// Offset of the CCGR register from the CCM base.
    pub ccgr_offset: u64,
    /// Bit offset of the 2-bit field.
    pub shift: u32,
    /// Leaf clocks that use the field.
    pub leaves: &'static [&'static str],
}

impl SharedGateField {
    /// The 2-bit field within the CCGR register.
    pub const fn field(&self) -> Field {
        Field::new(self.shift, 2)
    }
}

/// The NAND gate.
pub const NAND: SharedGateField = SharedGateField {
    name: "nand",
    ccgr_offset: 0x4300,
    shift: 0,
    leaves: &["nand_root_clk", "nand_usdhc_rawnand_clk"],
};

/// The MEDIA gate.
pub const MEDIA: SharedGateField = SharedGateField {
    name: "media",
    ccgr_offset: 0x45d0,
    shift: 0,
    leaves: &[
        "media_apb_root_clk",
        "media_axi_root_clk",
        "media_cam1_pix_root_clk",
        "media_cam2_pix_root_clk",
        "media_disp1_pix_root_clk",
        "media_disp2_pix_root_clk",
        "media_ldb_root_clk",
        "media_isp_root_clk",
    ],
};

/// All shared gates.
pub const SHARED_GATES: &[SharedGateField] = &[NAND, MEDIA];

/// A gate field, and the count of leaves that need it.
pub struct SharedGate<R> {
    field: Field,
    count: AtomicU32,
    register: Mutex<R>,
}

impl<R: ControlRegister> SharedGate<R> {
    /// Manage `field` within `register`. No leaf holds the gate yet.
    pub fn new(field: Field, register: R) -> Arc<Self> {
        Arc::new(Self {
            field,
            count: AtomicU32::new(0),
            register: Mutex::new(register),
        })
    }

    /// Create a leaf clock that shares this gate.
    pub fn leaf(self: &Arc<Self>, name: &'static str) -> GateLeaf<R> {
        GateLeaf {
            name,
            gate: Arc::clone(self),
            enabled: false,
        }
    }

    /// The number of leaves holding the gate.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Read whether the field is on in hardware.
    ///
    /// This only reads the register, so it's safe on a gate that some
    /// other agent owns.
    pub fn is_on(&self) -> Result<bool, Error> {
        let mut register = self.lock();
        Ok(self.field.get(register.read()?) != 0)
    }

    fn lock(&self) -> MutexGuard<'_, R> {
        self.register.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self) -> Result<(), Error> {
        // Hold the register across the count update so the 0 -> 1
        // and 1 -> 0 transitions can't interleave.
        let mut register = self.lock();
        if self.count.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Err(err) = update_field(&mut *register, self.field, NEEDED_ALL_MODES) {
                self.count.fetch_sub(1, Ordering::AcqRel);
                return Err(err);
            }
        }
        Ok(())
    }

    fn put(&self) -> Result<(), Error> {
        let mut register = self.lock();
        if self.count.load(Ordering::Acquire) == 0 {
            tracing::warn!("shared gate released more often than taken");
            return Ok(());
        }
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Err(err) = update_field(&mut *register, self.field, 0) {
                self.count.fetch_add(1, Ordering::AcqRel);
                return Err(err);
            }
        }
        Ok(())
    }
}

fn update_field<R: ControlRegister>(
    register: &mut R,
    field: Field,
    value: u32,
) -> Result<(), Error> {
    let current = register.read()?;
    register.write(field.set(current, value))
}

/// One leaf clock of a [`SharedGate`].
pub struct GateLeaf<R> {
    name: &'static str,
    gate: Arc<SharedGate<R>>,
    enabled: bool,
}

impl<R: ControlRegister> GateLeaf<R> {
    /// The leaf clock's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this leaf holds the gate.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take the gate. Does nothing if this leaf already holds it.
    pub fn enable(&mut self) -> Result<(), Error> {
        if !self.enabled {
            self.gate.get()?;
            self.enabled = true;
            tracing::debug!(leaf = self.name, count = self.gate.count(), "gate enabled");
        }
        Ok(())
    }

    /// Release the gate. Does nothing if this leaf doesn't hold it.
    pub fn disable(&mut self) -> Result<(), Error> {
        if self.enabled {
            self.gate.put()?;
            self.enabled = false;
            tracing::debug!(leaf = self.name, count = self.gate.count(), "gate disabled");
        }
        Ok(())
    }
}
