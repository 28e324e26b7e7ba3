// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register-level drivers for the SDI hardware.
//!
//! Each driver owns something implementing [`DeviceBus`] and knows nothing of
//! handles or locking; it is up to the caller to make sure that a driver is
//! used by one thread at a time. Every failure is returned as a [`Fault`] and
//! recorded in the driver module's trace ring.

pub mod comm_dev;
pub mod host_system;
pub mod nvram;

pub use comm_dev::CommDev;
pub use drv_sdi_api::{DeviceBus, Fault};
pub use host_system::HostSystem;
pub use nvram::{GeometryError, Nvram};
