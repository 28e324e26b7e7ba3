// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{fail, DynBus, Op};
use drv_sdi_api::{Fault, ResourceHdl, SdiError};
use drv_sdi_devices::CommDev;

/// Exclusive use of one Comm_Dev, handed out by
/// [`Sdi::comm_dev_session`](crate::Sdi::comm_dev_session).
///
/// The resource lock is held for as long as the session exists.
pub struct CommDevSession<'a> {
    hdl: ResourceHdl,
    dev: &'a mut CommDev<DynBus>,
}

impl<'a> CommDevSession<'a> {
    pub(crate) fn new(
        hdl: ResourceHdl,
        dev: &'a mut CommDev<DynBus>,
    ) -> Self {
        Self { hdl, dev }
    }

    fn check<T>(&self, op: Op, r: Result<T, Fault>) -> Result<T, SdiError> {
        r.map_err(|e| fail(self.hdl, op, e))
    }

    pub fn is_msg_present(&self) -> Result<bool, SdiError> {
        self.check(Op::IsMsgPresent, self.dev.is_msg_present())
    }

    pub fn is_write_buffer_ready(&self) -> Result<bool, SdiError> {
        self.check(Op::IsWriteBufferReady, self.dev.is_write_buffer_ready())
    }

    pub fn msg_read(&self, buf: &mut [u8]) -> Result<usize, SdiError> {
        self.check(Op::MsgRead, self.dev.msg_read(buf))
    }

    pub fn msg_write(&mut self, data: &[u8]) -> Result<(), SdiError> {
        let r = self.dev.msg_write(data);
        self.check(Op::MsgWrite, r)
    }

    pub fn flush(&mut self) -> Result<(), SdiError> {
        let r = self.dev.flush();
        self.check(Op::FlushMsgBuffer, r)
    }

    /// Bytes staged and not yet flushed.
    pub fn pending(&self) -> usize {
        self.dev.pending()
    }

    /// Reads the waiting message if there is one.
    pub fn try_recv(
        &self,
        buf: &mut [u8],
    ) -> Result<Option<usize>, SdiError> {
        if !self.is_msg_present()? {
            return Ok(None);
        }
        self.msg_read(buf).map(Some)
    }

    /// Sends `data` as one message if the controller is ready for it.
    ///
    /// Returns `Ok(false)` when it is not. Whether it returns that or an
    /// error, nothing is left staged.
    pub fn try_send(&mut self, data: &[u8]) -> Result<bool, SdiError> {
        if !self.is_write_buffer_ready()? {
            return Ok(false);
        }
        // Ready implies nothing was staged before this call.
        self.msg_write(data)?;
        if let Err(e) = self.flush() {
            self.dev.discard();
            return Err(e);
        }
        Ok(true)
    }
}
