// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use drv_sdi_api::regs::host_system::Register;
use drv_sdi_api::{BusError, DeviceBus};
use num_traits::FromPrimitive;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct HostSystemParams {
    pub slot: u8,
    pub unsupported: Vec<Register>,
}

struct State {
    slot: u8,
    booted: u8,
    unsupported: Vec<Register>,
    fault: Option<BusError>,
}

impl State {
    fn begin(&self, addr: u32, len: usize) -> Result<Register, BusError> {
        if let Some(e) = self.fault {
            return Err(e);
        }
        let reg = Register::from_u32(addr).ok_or(BusError::NoRegister)?;
        if self.unsupported.contains(&reg) {
            return Err(BusError::NoRegister);
        }
        if len != 1 {
            return Err(BusError::BadArg);
        }
        Ok(reg)
    }
}

/// Bus side of an emulated host system CPLD.
pub struct EmulatedHostSystem {
    state: Arc<spin::Mutex<State>>,
}

/// Controller side of an emulated host system.
#[derive(Clone)]
pub struct HostSystemPort {
    state: Arc<spin::Mutex<State>>,
}

impl EmulatedHostSystem {
    pub fn new(params: HostSystemParams) -> (Self, HostSystemPort) {
        let state = Arc::new(spin::Mutex::new(State {
            slot: params.slot,
            booted: 0,
            unsupported: params.unsupported,
            fault: None,
        }));
        (
            Self {
                state: state.clone(),
            },
            HostSystemPort { state },
        )
    }
}

impl DeviceBus for EmulatedHostSystem {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let s = self.state.lock();
        buf[0] = match s.begin(addr, buf.len())? {
            Register::SlotPosition => s.slot,
            Register::Booted => s.booted,
        };
        Ok(())
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        let mut s = self.state.lock();
        let reg = s.begin(addr, data.len())?;
        match reg {
            Register::SlotPosition => Err(BusError::BadArg),
            Register::Booted => match data[0] {
                v @ (0 | 1) => {
                    s.booted = v;
                    Ok(())
                }
                _ => Err(BusError::BadArg),
            },
        }
    }
}

impl HostSystemPort {
    pub fn booted(&self) -> bool {
        self.state.lock().booted != 0
    }

    pub fn set_slot(&self, slot: u8) {
        self.state.lock().slot = slot;
    }

    pub fn inject_fault(&self, fault: Option<BusError>) {
        self.state.lock().fault = fault;
    }
}
