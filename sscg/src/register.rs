// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: Copyright 2024 Ian McIntyre

//! Access to single 32-bit control registers.

use probe_rs::MemoryInterface;

use crate::{context, Error};

/// A single 32-bit register.
///
/// Tuning and gate logic only ever talk to hardware through this
/// trait. Implementations decide how the access reaches the SoC.
pub trait ControlRegister {
    /// Read the register.
    fn read(&mut self) -> Result<u32, Error>;
    /// Write the register. The write must land before this returns.
    fn write(&mut self, value: u32) -> Result<(), Error>;
}

impl<R: ControlRegister + ?Sized> ControlRegister for &mut R {
    fn read(&mut self) -> Result<u32, Error> {
        (**self).read()
    }
    fn write(&mut self, value: u32) -> Result<(), Error> {
        (**self).write(value)
    }
}

/// A register on an MCU attached through a debug probe.
pub struct ProbeRegister<'a> {
    mem: &'a mut dyn MemoryInterface,
    address: u64,
}

impl<'a> ProbeRegister<'a> {
    /// Access the register at `address` through `mem`.
    pub fn new(mem: &'a mut dyn MemoryInterface, address: u64) -> Self {
        Self { mem, address }
    }

    /// Returns the register's address.
    pub fn address(&self) -> u64 {
        self.address
    }
}

impl ControlRegister for ProbeRegister<'_> {
    fn read(&mut self) -> Result<u32, Error> {
        self.mem
            .read_word_32(self.address)
            .map_err(context("reading the register"))
    }

    fn write(&mut self, value: u32) -> Result<(), Error> {
        tracing::debug!(address = self.address, value, "register write");
        self.mem
            .write_word_32(self.address, value)
            .map_err(context("writing the register"))?;

        // Force the probe to dispatch the write to the MCU.
        self.mem
            .flush()
            .map_err(context("flushing the write to the MCU"))
    }
}

/// A register that lives in memory and remembers every write.
///
/// Use this for dry runs, or to check the sequence of writes a
/// tuning operation performs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegister {
    value: u32,
    writes: Vec<u32>,
}

impl MemoryRegister {
    /// A register with the given reset value.
    pub fn new(value: u32) -> Self {
        Self {
            value,
            writes: Vec::new(),
        }
    }

    /// The current register value.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Every value written, oldest first.
    pub fn writes(&self) -> &[u32] {
        &self.writes
    }

    /// Forget the write history. The value is kept.
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl ControlRegister for MemoryRegister {
    fn read(&mut self) -> Result<u32, Error> {
        Ok(self.value)
    }

    fn write(&mut self, value: u32) -> Result<(), Error> {
        tracing::debug!(value, "register write (memory)");
        self.value = value;
        self.writes.push(value);
        Ok(())
    }
}
