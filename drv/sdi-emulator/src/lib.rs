// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Emulated SDI hardware.
//!
//! Each emulated device is split in two. The device half implements
//! [`DeviceBus`](drv_sdi_api::DeviceBus) and is handed to a driver exactly as
//! a real bus would be. The port half stays with whoever plays the other end
//! of the wire (the chassis controller, a test, a bring-up shell) and can
//! inspect and perturb the device state. Both halves share one lock, so a
//! single bus transfer is always atomic with respect to the port.
//!
//! The devices check transfers the way fussy hardware would: wrong widths,
//! writes to read-only registers and EEPROM page overruns are all refused
//! with [`BusError::BadArg`](drv_sdi_api::BusError::BadArg).

mod comm_dev;
mod host_system;
mod nvram;

pub use comm_dev::{
    CommDevParams, ControllerPort, EmulatedCommDev, PortError, NB_QUEUE_DEPTH,
};
pub use host_system::{EmulatedHostSystem, HostSystemParams, HostSystemPort};
pub use nvram::{EmulatedNvram, NvramPort};
