// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::BusError;
use alloc::boxed::Box;
use alloc::sync::Arc;

/// Access to a single device on whatever bus it hangs off.
///
/// For register devices `addr` is a register number and the length of the
/// buffer is the register width. For memory devices it is a byte address and
/// the transfer covers `addr..addr + buf.len()`.
///
/// Implementations perform exactly one transfer per call and do not retry.
pub trait DeviceBus {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError>;
    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError>;
}

impl<B: DeviceBus + ?Sized> DeviceBus for &B {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(addr, buf)
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        (**self).write(addr, data)
    }
}

impl<B: DeviceBus + ?Sized> DeviceBus for Box<B> {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(addr, buf)
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        (**self).write(addr, data)
    }
}

impl<B: DeviceBus + ?Sized> DeviceBus for Arc<B> {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(addr, buf)
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        (**self).write(addr, data)
    }
}
