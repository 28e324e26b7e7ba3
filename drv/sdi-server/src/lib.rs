// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SDI accessor surface.
//!
//! [`Sdi`] resolves [`ResourceHdl`]s through its [`ResourceTable`] and runs
//! each accessor against the driver behind the handle, with that resource's
//! lock held for the whole call. Calls on different handles never contend;
//! calls on the same handle are serialized. Anything that needs more than
//! one call to be atomic (poll then act, write then flush) goes through
//! [`Sdi::comm_dev_session`].
//!
//! Failures are traced here with the handle, the operation and the detailed
//! [`Fault`], then collapsed to [`SdiError`] for the caller.

use drv_sdi_api::{
    DeviceBus, Fault, FwVersion, PlatformInfo, ResourceHdl, ResourceKind,
    SdiError,
};
use drv_sdi_devices::{CommDev, HostSystem, Nvram};
use ringbuf::*;

mod board;
mod config;
mod session;
mod table;

pub use board::{Board, Ports};
pub use config::{
    CommDevConfig, CommDevRegister, HostSystemConfig, HostSystemRegister,
    NvramConfig, SdiConfig,
};
pub use session::CommDevSession;
pub use table::{ResourceTable, SharedResource, TableError, TABLE_CAPACITY};

/// Type-erased bus used by every resource in the table.
pub type DynBus = Box<dyn DeviceBus + Send>;

/// A driver installed in the resource table.
pub enum Resource {
    CommDev(CommDev<DynBus>),
    HostSystem(HostSystem<DynBus>),
    Nvram(Nvram<DynBus>),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::CommDev(_) => ResourceKind::CommDev,
            Self::HostSystem(_) => ResourceKind::HostSystem,
            Self::Nvram(_) => ResourceKind::Nvram,
        }
    }

    fn wrong_kind(&self, expected: ResourceKind) -> Fault {
        Fault::WrongKind {
            expected,
            actual: self.kind(),
        }
    }
}

/// Operations, as recorded in the trace ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Op {
    MsgRead,
    MsgWrite,
    PlatformInfoGet,
    HostSwVersionGet,
    HostSwVersionSet,
    HostTemperatureSet,
    FlushMsgBuffer,
    IsWriteBufferReady,
    IsMsgPresent,
    Session,
    SlotPosGet,
    BootedSet,
    NvramSize,
    NvramRead,
    NvramWrite,
    Unregister,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Registered(ResourceHdl, ResourceKind),
    RegisterFailed(ResourceKind, TableError),
    Unregistered(ResourceHdl),
    Failed {
        hdl: ResourceHdl,
        op: Op,
        fault: Fault,
    },
}

ringbuf!(Trace, 64, Trace::None);

/// Records a fault against `hdl` and collapses it.
fn fail(hdl: ResourceHdl, op: Op, fault: Fault) -> SdiError {
    ringbuf_entry!(Trace::Failed { hdl, op, fault });
    SdiError::from(fault)
}

#[derive(Default)]
pub struct Sdi {
    table: ResourceTable,
}

impl Sdi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    /// Installs a driver and returns its handle.
    pub fn register(
        &self,
        name: &str,
        resource: Resource,
    ) -> Result<ResourceHdl, TableError> {
        let kind = resource.kind();
        match self.table.insert(name, resource) {
            Ok(hdl) => {
                ringbuf_entry!(Trace::Registered(hdl, kind));
                Ok(hdl)
            }
            Err(e) => {
                ringbuf_entry!(Trace::RegisterFailed(kind, e));
                Err(e)
            }
        }
    }

    pub fn register_comm_dev(
        &self,
        name: &str,
        bus: impl DeviceBus + Send + 'static,
    ) -> Result<ResourceHdl, TableError> {
        let bus: DynBus = Box::new(bus);
        self.register(name, Resource::CommDev(CommDev::new(bus)))
    }

    pub fn register_host_system(
        &self,
        name: &str,
        bus: impl DeviceBus + Send + 'static,
    ) -> Result<ResourceHdl, TableError> {
        let bus: DynBus = Box::new(bus);
        self.register(name, Resource::HostSystem(HostSystem::new(bus)))
    }

    pub fn register_nvram(
        &self,
        name: &str,
        nvram: Nvram<DynBus>,
    ) -> Result<ResourceHdl, TableError> {
        self.register(name, Resource::Nvram(nvram))
    }

    /// Looks up a resource by kind and name.
    pub fn lookup(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Option<ResourceHdl> {
        self.table.lookup(kind, name)
    }

    /// Removes a resource. Its handle is invalid from here on.
    pub fn unregister(&self, hdl: ResourceHdl) -> Result<(), SdiError> {
        self.table
            .remove(hdl)
            .map_err(|fault| fail(hdl, Op::Unregister, fault))?;
        ringbuf_entry!(Trace::Unregistered(hdl));
        Ok(())
    }

    /// Runs `f` against the resource behind `hdl` with its lock held.
    fn call<T>(
        &self,
        hdl: ResourceHdl,
        op: Op,
        f: impl FnOnce(&mut Resource) -> Result<T, Fault>,
    ) -> Result<T, SdiError> {
        let resource =
            self.table.resolve(hdl).map_err(|e| fail(hdl, op, e))?;
        let mut resource = resource.lock();
        f(&mut *resource).map_err(|e| fail(hdl, op, e))
    }

    fn comm_dev<T>(
        &self,
        hdl: ResourceHdl,
        op: Op,
        f: impl FnOnce(&mut CommDev<DynBus>) -> Result<T, Fault>,
    ) -> Result<T, SdiError> {
        self.call(hdl, op, |r| match r {
            Resource::CommDev(dev) => f(dev),
            other => Err(other.wrong_kind(ResourceKind::CommDev)),
        })
    }

    fn host_system<T>(
        &self,
        hdl: ResourceHdl,
        op: Op,
        f: impl FnOnce(&HostSystem<DynBus>) -> Result<T, Fault>,
    ) -> Result<T, SdiError> {
        self.call(hdl, op, |r| match r {
            Resource::HostSystem(host) => f(&*host),
            other => Err(other.wrong_kind(ResourceKind::HostSystem)),
        })
    }

    fn nvram<T>(
        &self,
        hdl: ResourceHdl,
        op: Op,
        f: impl FnOnce(&Nvram<DynBus>) -> Result<T, Fault>,
    ) -> Result<T, SdiError> {
        self.call(hdl, op, |r| match r {
            Resource::Nvram(nv) => f(&*nv),
            other => Err(other.wrong_kind(ResourceKind::Nvram)),
        })
    }

    /// Reads the waiting northbound message into `buf` and returns its
    /// length. Fails if no message is waiting or `buf` cannot hold all of it.
    pub fn comm_dev_msg_read(
        &self,
        hdl: ResourceHdl,
        buf: &mut [u8],
    ) -> Result<usize, SdiError> {
        self.comm_dev(hdl, Op::MsgRead, |dev| dev.msg_read(buf))
    }

    /// Stages `data` for the next flush. Fails, staging nothing, if it does
    /// not fit.
    pub fn comm_dev_msg_write(
        &self,
        hdl: ResourceHdl,
        data: &[u8],
    ) -> Result<(), SdiError> {
        self.comm_dev(hdl, Op::MsgWrite, |dev| dev.msg_write(data))
    }

    pub fn comm_dev_platform_info_get(
        &self,
        hdl: ResourceHdl,
    ) -> Result<PlatformInfo, SdiError> {
        self.comm_dev(hdl, Op::PlatformInfoGet, |dev| dev.platform_info())
    }

    pub fn comm_dev_host_sw_version_get(
        &self,
        hdl: ResourceHdl,
    ) -> Result<FwVersion, SdiError> {
        self.comm_dev(hdl, Op::HostSwVersionGet, |dev| dev.host_sw_version())
    }

    pub fn comm_dev_host_sw_version_set(
        &self,
        hdl: ResourceHdl,
        version: &[u8],
    ) -> Result<(), SdiError> {
        self.comm_dev(hdl, Op::HostSwVersionSet, |dev| {
            dev.set_host_sw_version(version)
        })
    }

    pub fn comm_dev_host_temperature_set(
        &self,
        hdl: ResourceHdl,
        temp: i32,
    ) -> Result<(), SdiError> {
        self.comm_dev(hdl, Op::HostTemperatureSet, |dev| {
            dev.set_host_temperature(temp)
        })
    }

    /// Sends whatever has been staged. Succeeds trivially if nothing has.
    pub fn comm_dev_flush_msg_buffer(
        &self,
        hdl: ResourceHdl,
    ) -> Result<(), SdiError> {
        self.comm_dev(hdl, Op::FlushMsgBuffer, |dev| dev.flush())
    }

    pub fn comm_dev_is_write_buffer_ready(
        &self,
        hdl: ResourceHdl,
    ) -> Result<bool, SdiError> {
        self.comm_dev(hdl, Op::IsWriteBufferReady, |dev| {
            dev.is_write_buffer_ready()
        })
    }

    pub fn comm_dev_is_msg_present(
        &self,
        hdl: ResourceHdl,
    ) -> Result<bool, SdiError> {
        self.comm_dev(hdl, Op::IsMsgPresent, |dev| dev.is_msg_present())
    }

    /// Runs `f` with exclusive use of the Comm_Dev behind `hdl`.
    ///
    /// No other call on `hdl` can run until `f` returns, so a poll and the
    /// action that depends on it cannot be split by another thread.
    ///
    /// The lock is not re-entrant: `f` must use the session it is given.
    /// Calling any `Sdi` method on `hdl` from inside `f` spins forever.
    pub fn comm_dev_session<T>(
        &self,
        hdl: ResourceHdl,
        f: impl FnOnce(&mut CommDevSession<'_>) -> T,
    ) -> Result<T, SdiError> {
        self.comm_dev(hdl, Op::Session, |dev| {
            Ok(f(&mut CommDevSession::new(hdl, dev)))
        })
    }

    pub fn host_system_slot_pos_get(
        &self,
        hdl: ResourceHdl,
    ) -> Result<u8, SdiError> {
        self.host_system(hdl, Op::SlotPosGet, |host| host.slot_pos())
    }

    pub fn host_system_booted_set(
        &self,
        hdl: ResourceHdl,
        booted: bool,
    ) -> Result<(), SdiError> {
        self.host_system(hdl, Op::BootedSet, |host| host.set_booted(booted))
    }

    pub fn nvram_size(&self, hdl: ResourceHdl) -> Result<u32, SdiError> {
        self.nvram(hdl, Op::NvramSize, |nv| Ok(nv.size()))
    }

    /// Fills `buf` from offset `ofs`. Fails without reading anything if the
    /// range runs past the end of the part.
    pub fn nvram_read(
        &self,
        hdl: ResourceHdl,
        buf: &mut [u8],
        ofs: u32,
    ) -> Result<(), SdiError> {
        self.nvram(hdl, Op::NvramRead, |nv| nv.read(buf, ofs))
    }

    /// Writes `data` at offset `ofs`. Fails without writing anything if the
    /// range runs past the end of the part.
    pub fn nvram_write(
        &self,
        hdl: ResourceHdl,
        data: &[u8],
        ofs: u32,
    ) -> Result<(), SdiError> {
        self.nvram(hdl, Op::NvramWrite, |nv| nv.write(data, ofs))
    }
}

/// Returns `true` if a fault matching `pred` has been traced for `hdl`.
///
/// The trace ring is shared by every [`Sdi`] in the process, and handles are
/// only unique within one `Sdi`. A match may therefore come from another
/// instance that handed out the same raw handle.
pub fn fault_traced(
    hdl: ResourceHdl,
    pred: impl Fn(Op, &Fault) -> bool,
) -> bool {
    __RINGBUF.any(|t| match t {
        Trace::Failed { hdl: h, op, fault } => *h == hdl && pred(*op, fault),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_sdi_emulator::{
        CommDevParams, EmulatedCommDev, EmulatedHostSystem, EmulatedNvram,
        HostSystemParams,
    };

    fn sdi() -> (Sdi, ResourceHdl, ResourceHdl, ResourceHdl) {
        let sdi = Sdi::new();
        let (cd, _) = EmulatedCommDev::new(CommDevParams::default());
        let (hs, _) = EmulatedHostSystem::new(HostSystemParams {
            slot: 3,
            ..Default::default()
        });
        let (nv, _) = EmulatedNvram::new(128, 16);

        let cd = sdi.register_comm_dev("cd", cd).unwrap();
        let hs = sdi.register_host_system("hs", hs).unwrap();
        let nv = sdi
            .register_nvram(
                "nv",
                Nvram::new(Box::new(nv) as DynBus, 128, 16).unwrap(),
            )
            .unwrap();
        (sdi, cd, hs, nv)
    }

    #[test]
    fn wrong_kind_is_refused_and_traced() {
        let (sdi, cd, hs, nv) = sdi();
        assert_eq!(
            sdi.comm_dev_is_msg_present(hs),
            Err(SdiError::NotPermitted)
        );
        assert!(fault_traced(hs, |op, f| op == Op::IsMsgPresent
            && *f
                == Fault::WrongKind {
                    expected: ResourceKind::CommDev,
                    actual: ResourceKind::HostSystem,
                }));

        assert!(sdi.nvram_size(cd).is_err());
        assert!(sdi.host_system_slot_pos_get(nv).is_err());
        assert_eq!(sdi.host_system_slot_pos_get(hs), Ok(3));
        assert_eq!(sdi.nvram_size(nv), Ok(128));
    }

    #[test]
    fn slot_position_keeps_its_width() {
        let sdi = Sdi::new();
        let (bus, _) = EmulatedHostSystem::new(HostSystemParams {
            slot: u8::MAX,
            ..Default::default()
        });
        let hs = sdi.register_host_system("hs", bus).unwrap();
        let slot: u8 = sdi.host_system_slot_pos_get(hs).unwrap();
        assert_eq!(slot, u8::MAX);
    }

    #[test]
    fn unregistered_handle_fails() {
        let (sdi, cd, _, _) = sdi();
        sdi.unregister(cd).unwrap();
        assert_eq!(
            sdi.comm_dev_flush_msg_buffer(cd),
            Err(SdiError::NotPermitted)
        );
        assert!(fault_traced(cd, |op, f| op == Op::FlushMsgBuffer
            && *f == Fault::InvalidHandle));
        assert_eq!(sdi.unregister(cd), Err(SdiError::NotPermitted));
        assert_eq!(sdi.lookup(ResourceKind::CommDev, "cd"), None);
    }

    #[test]
    fn lookup_by_name() {
        let (sdi, cd, hs, nv) = sdi();
        assert_eq!(sdi.lookup(ResourceKind::CommDev, "cd"), Some(cd));
        assert_eq!(sdi.lookup(ResourceKind::HostSystem, "hs"), Some(hs));
        assert_eq!(sdi.lookup(ResourceKind::Nvram, "nv"), Some(nv));
        assert_eq!(sdi.lookup(ResourceKind::Nvram, "cd"), None);
        assert_eq!(sdi.table().len(), 3);
    }

    #[test]
    fn duplicate_registration() {
        let (sdi, _, _, _) = sdi();
        let (cd, _) = EmulatedCommDev::new(CommDevParams::default());
        assert_eq!(
            sdi.register_comm_dev("cd", cd),
            Err(TableError::DuplicateName)
        );
    }
}
