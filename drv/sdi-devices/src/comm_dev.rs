// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the Comm_Dev mailbox.
//!
//! The Comm_Dev is the host board's window onto the chassis management
//! controller. Besides a handful of identity and telemetry registers it
//! carries one message mailbox per direction:
//!
//! - Northbound (controller to host): `Status.MSG_PRESENT` is set while a
//!   message is waiting; its length is in `NbLength` and its bytes in
//!   `NbData`. Writing `NbAck` drains it and exposes the next one.
//! - Southbound (host to controller): a single write to `SbData` delivers one
//!   message. The controller only takes it while `Status.SB_READY` is set.
//!
//! Southbound writes are staged in the driver and go out as a single message
//! on [`CommDev::flush`]. Nothing here blocks: callers poll
//! [`CommDev::is_msg_present`] and [`CommDev::is_write_buffer_ready`] and act
//! on the answer.

use drv_sdi_api::regs::comm_dev::{Register, Status, NB_ACK};
use drv_sdi_api::{
    BusError, DeviceBus, Fault, FwVersion, PlatformInfo, ServiceTag,
    BUFFER_MAX_SIZE,
};
use ringbuf::*;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    ReadFailed(Register, BusError),
    WriteFailed(Register, BusError),
    Unterminated(Register),
    BadLength(u16),
    Received(u16),
    ShortBuffer { needed: u16, have: usize },
    Staged { len: u16, pending: u16 },
    Rejected { len: usize, free: usize },
    NotReady { pending: u16 },
    Flushed(u16),
    Discarded(u16),
}

ringbuf!(Trace, 32, Trace::None);

pub struct CommDev<B> {
    bus: B,
    staging: heapless::Vec<u8, BUFFER_MAX_SIZE>,
}

impl<B: DeviceBus> CommDev<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            staging: heapless::Vec::new(),
        }
    }

    fn read_reg(&self, reg: Register, buf: &mut [u8]) -> Result<(), Fault> {
        self.bus.read(reg as u32, buf).map_err(|code| {
            ringbuf_entry!(Trace::ReadFailed(reg, code));
            Fault::from(code)
        })
    }

    fn write_reg(&self, reg: Register, data: &[u8]) -> Result<(), Fault> {
        self.bus.write(reg as u32, data).map_err(|code| {
            ringbuf_entry!(Trace::WriteFailed(reg, code));
            Fault::from(code)
        })
    }

    fn read_string<const N: usize>(
        &self,
        reg: Register,
    ) -> Result<drv_sdi_api::CStrBuf<N>, Fault> {
        let mut raw = [0u8; N];
        self.read_reg(reg, &mut raw)?;
        drv_sdi_api::CStrBuf::from_register(&raw).map_err(|_| {
            ringbuf_entry!(Trace::Unterminated(reg));
            Fault::BadData
        })
    }

    fn status(&self) -> Result<Status, Fault> {
        let mut raw = [0u8];
        self.read_reg(Register::Status, &mut raw)?;
        Ok(Status::from_bits_truncate(raw[0]))
    }

    /// Reads the static platform information.
    ///
    /// The record is only built once every field has been read and decoded,
    /// so a failure part way through returns nothing at all.
    pub fn platform_info(&self) -> Result<PlatformInfo, Fault> {
        let service_tag: ServiceTag = self.read_string(Register::ServiceTag)?;
        let fw_version: FwVersion =
            self.read_string(Register::CommDevFwVersion)?;
        let mut slot = [0u8; 4];
        self.read_reg(Register::SlotOccupation, &mut slot)?;

        Ok(PlatformInfo::new(
            &service_tag,
            &fw_version,
            u32::from_le_bytes(slot),
        ))
    }

    pub fn host_sw_version(&self) -> Result<FwVersion, Fault> {
        self.read_string(Register::HostSwVersion)
    }

    /// Sends the host software version to the controller.
    ///
    /// `version` is taken up to its first NUL, or whole if it has none, and
    /// must fit the 65-byte register with its terminator. It is checked
    /// before anything goes out on the bus.
    pub fn set_host_sw_version(&self, version: &[u8]) -> Result<(), Fault> {
        let version = FwVersion::from_bytes(version)?;
        self.write_reg(Register::HostSwVersion, &version.to_register())
    }

    pub fn set_host_temperature(&self, temp: i32) -> Result<(), Fault> {
        self.write_reg(Register::HostTemperature, &temp.to_le_bytes())
    }

    pub fn is_msg_present(&self) -> Result<bool, Fault> {
        Ok(self.status()?.contains(Status::MSG_PRESENT))
    }

    /// Returns `true` if a write of up to [`BUFFER_MAX_SIZE`] bytes would be
    /// accepted and could be flushed straight away.
    pub fn is_write_buffer_ready(&self) -> Result<bool, Fault> {
        if !self.staging.is_empty() {
            return Ok(false);
        }
        Ok(self.status()?.contains(Status::SB_READY))
    }

    /// Number of bytes staged for the next flush.
    pub fn pending(&self) -> usize {
        self.staging.len()
    }

    /// Drops everything staged without sending it.
    pub fn discard(&mut self) {
        if !self.staging.is_empty() {
            ringbuf_entry!(Trace::Discarded(self.staging.len() as u16));
            self.staging.clear();
        }
    }

    /// Reads the waiting northbound message into `buf`, returning its
    /// length, and drains it from the controller.
    ///
    /// Fails with [`Fault::NoMessage`] if nothing is waiting. If `buf` is too
    /// short for the whole message this fails without draining it; messages
    /// are never truncated.
    pub fn msg_read(&self, buf: &mut [u8]) -> Result<usize, Fault> {
        if !self.is_msg_present()? {
            return Err(Fault::NoMessage);
        }

        let mut raw = [0u8; 2];
        self.read_reg(Register::NbLength, &mut raw)?;
        let len = u16::from_le_bytes(raw);
        let n = usize::from(len);
        if n > BUFFER_MAX_SIZE {
            ringbuf_entry!(Trace::BadLength(len));
            return Err(Fault::BadData);
        }
        if buf.len() < n {
            ringbuf_entry!(Trace::ShortBuffer {
                needed: len,
                have: buf.len()
            });
            return Err(Fault::BufferTooSmall {
                needed: n,
                have: buf.len(),
            });
        }

        self.read_reg(Register::NbData, &mut buf[..n])?;
        self.write_reg(Register::NbAck, &[NB_ACK])?;
        ringbuf_entry!(Trace::Received(len));
        Ok(n)
    }

    /// Appends `data` to the southbound staging buffer.
    ///
    /// Nothing is sent until [`Self::flush`]. A write that does not fit is
    /// refused whole and the staging buffer is left as it was.
    pub fn msg_write(&mut self, data: &[u8]) -> Result<(), Fault> {
        if data.len() > BUFFER_MAX_SIZE {
            ringbuf_entry!(Trace::Rejected {
                len: data.len(),
                free: BUFFER_MAX_SIZE - self.staging.len(),
            });
            return Err(Fault::Oversize { len: data.len() });
        }

        let free = self.staging.capacity() - self.staging.len();
        let fault = Fault::BufferFull {
            len: data.len(),
            free,
        };
        if data.len() > free {
            ringbuf_entry!(Trace::Rejected {
                len: data.len(),
                free
            });
            return Err(fault);
        }
        self.staging.extend_from_slice(data).map_err(|_| fault)?;

        ringbuf_entry!(Trace::Staged {
            len: data.len() as u16,
            pending: self.staging.len() as u16,
        });
        Ok(())
    }

    /// Sends the staged bytes to the controller as one message.
    ///
    /// With nothing staged this succeeds without touching the bus. The
    /// staged bytes are kept if the controller is not ready or the transfer
    /// fails, so the flush can simply be retried.
    pub fn flush(&mut self) -> Result<(), Fault> {
        if self.staging.is_empty() {
            return Ok(());
        }
        let pending = self.staging.len() as u16;

        if !self.status()?.contains(Status::SB_READY) {
            ringbuf_entry!(Trace::NotReady { pending });
            return Err(Fault::NotReady);
        }
        self.write_reg(Register::SbData, &self.staging)?;

        ringbuf_entry!(Trace::Flushed(pending));
        self.staging.clear();
        Ok(())
    }
}
