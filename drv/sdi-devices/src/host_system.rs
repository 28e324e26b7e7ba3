// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the host system's board registers

use drv_sdi_api::regs::host_system::Register;
use drv_sdi_api::{BusError, DeviceBus, Fault};
use ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    ReadFailed(Register, BusError),
    WriteFailed(Register, BusError),
    BadBooted(u8),
    Booted(bool),
}

ringbuf!(Trace, 16, Trace::None);

pub struct HostSystem<B> {
    bus: B,
}

impl<B: DeviceBus> HostSystem<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    fn read_reg(&self, reg: Register) -> Result<u8, Fault> {
        let mut val = [0u8];
        self.bus.read(reg as u32, &mut val).map_err(|code| {
            ringbuf_entry!(Trace::ReadFailed(reg, code));
            Fault::from(code)
        })?;
        Ok(val[0])
    }

    fn write_reg(&self, reg: Register, val: u8) -> Result<(), Fault> {
        self.bus.write(reg as u32, &[val]).map_err(|code| {
            ringbuf_entry!(Trace::WriteFailed(reg, code));
            Fault::from(code)
        })
    }

    /// Physical slot this board occupies.
    pub fn slot_pos(&self) -> Result<u8, Fault> {
        self.read_reg(Register::SlotPosition)
    }

    /// Tells the controller whether the host has finished booting.
    pub fn set_booted(&self, booted: bool) -> Result<(), Fault> {
        self.write_reg(Register::Booted, u8::from(booted))?;
        ringbuf_entry!(Trace::Booted(booted));
        Ok(())
    }

    pub fn booted(&self) -> Result<bool, Fault> {
        match self.read_reg(Register::Booted)? {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                ringbuf_entry!(Trace::BadBooted(other));
                Err(Fault::BadData)
            }
        }
    }
}
