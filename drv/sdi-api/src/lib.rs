// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! API types for the SDI platform-management drivers.
//!
//! Three kinds of hardware resource sit behind the SDI layer: the Comm_Dev
//! (the host board's mailbox to the chassis management controller), the host
//! system itself, and NVRAM. Callers name any of them with an opaque
//! [`ResourceHdl`] and get back a uniform [`SdiError`] on failure. The richer
//! [`Fault`] type carries the actual cause inside the driver layer, where it
//! is traced before being collapsed at the boundary.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use num_derive::FromPrimitive;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

mod bus;
mod cstr;
pub mod regs;

pub use bus::DeviceBus;
pub use cstr::{CStrBuf, StringError};

/// Size of the service tag string, including its terminator.
pub const SERVICE_TAG_SIZE: usize = 35;

/// Size of a firmware version string, including its terminator.
pub const FW_VERSION_SIZE: usize = 65;

/// Capacity of each Comm_Dev message buffer.
pub const BUFFER_MAX_SIZE: usize = 4100;

pub type ServiceTag = CStrBuf<SERVICE_TAG_SIZE>;
pub type FwVersion = CStrBuf<FW_VERSION_SIZE>;

/// Opaque token naming one hardware-backed endpoint.
///
/// The low bits index the resource table; the high bits carry the generation
/// of that table slot, so a handle kept past its resource's removal no longer
/// matches and fails to resolve instead of reaching whatever was installed in
/// the slot afterwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct ResourceHdl(u32);

impl ResourceHdl {
    /// Number of bits used for the table index.
    pub const INDEX_BITS: u32 = 16;

    /// Derived mask of the index bits portion.
    pub const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    /// A handle that never resolves.
    pub const INVALID: Self = Self(!0);

    pub const fn for_index_and_gen(index: usize, gen: Generation) -> Self {
        Self(
            (index as u32 & Self::INDEX_MASK)
                | (gen.0 as u32) << Self::INDEX_BITS,
        )
    }

    pub const fn index(&self) -> usize {
        (self.0 & Self::INDEX_MASK) as usize
    }

    pub const fn generation(&self) -> Generation {
        Generation((self.0 >> Self::INDEX_BITS) as u16)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn into_raw(self) -> u32 {
        self.0
    }
}

/// Generation number of a resource table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Generation(u16);

impl Generation {
    pub const ZERO: Self = Self(0);

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u8)]
pub enum ResourceKind {
    CommDev = 1,
    HostSystem = 2,
    Nvram = 3,
}

/// Response codes from the bus underneath a device.
///
/// These are specific so that traces say what actually happened; callers
/// above the driver layer never see them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u32)]
pub enum BusError {
    /// Bad response from the device
    BadResponse = 1,
    /// Bad argument sent to the bus
    BadArg = 2,
    /// Device did not answer at its address
    NoDevice = 3,
    /// Device does not implement the indicated register
    NoRegister = 4,
    /// Device refused the transfer
    Nack = 5,
    /// Transfer did not complete in time
    Timeout = 6,
    /// Bus error
    BusError = 7,
}

/// Detailed cause of a failed SDI operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fault {
    /// The handle is unknown, removed or stale.
    InvalidHandle,
    /// The handle names a resource of a different kind.
    WrongKind {
        expected: ResourceKind,
        actual: ResourceKind,
    },
    /// The backing hardware does not implement this operation.
    Unsupported,
    /// The bus reported an error.
    Bus(BusError),
    /// An NVRAM access falls outside the device.
    OutOfBounds { ofs: u32, len: usize, size: u32 },
    /// A message is larger than [`BUFFER_MAX_SIZE`].
    Oversize { len: usize },
    /// A message does not fit the space left in the write buffer.
    BufferFull { len: usize, free: usize },
    /// No northbound message is present.
    NoMessage,
    /// The caller's buffer cannot hold the whole message.
    BufferTooSmall { needed: usize, have: usize },
    /// The controller is not accepting southbound messages.
    NotReady,
    /// A caller-supplied string is not terminated within its bound.
    BadString(StringError),
    /// The device returned data that does not decode.
    BadData,
}

impl From<BusError> for Fault {
    fn from(e: BusError) -> Self {
        match e {
            BusError::NoRegister => Self::Unsupported,
            e => Self::Bus(e),
        }
    }
}

impl From<StringError> for Fault {
    fn from(e: StringError) -> Self {
        Self::BadString(e)
    }
}

/// Status returned across the SDI boundary.
///
/// Every [`Fault`] collapses to `NotPermitted`, the equivalent of `EPERM`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(u32)]
pub enum SdiError {
    NotPermitted = 1,
}

impl SdiError {
    /// The POSIX errno carried by this error.
    pub const fn errno(self) -> i32 {
        self as i32
    }
}

impl From<Fault> for SdiError {
    fn from(_: Fault) -> Self {
        Self::NotPermitted
    }
}

impl From<SdiError> for u32 {
    fn from(e: SdiError) -> Self {
        e as u32
    }
}

/// Static platform information held by the Comm_Dev.
///
/// The layout matches the C `sdi_platform_info_t` byte for byte.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct PlatformInfo {
    pub service_tag: [u8; SERVICE_TAG_SIZE],
    pub comm_dev_fw_ver: [u8; FW_VERSION_SIZE],
    pub slot_occupation: u32,
}

const_assert_eq!(core::mem::size_of::<PlatformInfo>(), 104);
const_assert_eq!(core::mem::align_of::<PlatformInfo>(), 4);

impl PlatformInfo {
    pub fn new(
        service_tag: &ServiceTag,
        comm_dev_fw_ver: &FwVersion,
        slot_occupation: u32,
    ) -> Self {
        Self {
            service_tag: service_tag.to_register(),
            comm_dev_fw_ver: comm_dev_fw_ver.to_register(),
            slot_occupation,
        }
    }

    /// Service tag content, without its terminator.
    pub fn service_tag(&self) -> &[u8] {
        &self.service_tag[..cstr::content_len(&self.service_tag)]
    }

    /// Comm_Dev firmware version content, without its terminator.
    pub fn comm_dev_fw_ver(&self) -> &[u8] {
        &self.comm_dev_fw_ver[..cstr::content_len(&self.comm_dev_fw_ver)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn handle_packs_index_and_generation() {
        let gen = Generation::ZERO.next().next();
        let hdl = ResourceHdl::for_index_and_gen(5, gen);
        assert_eq!(hdl.index(), 5);
        assert_eq!(hdl.generation(), gen);
        assert_eq!(hdl.into_raw(), 0x0002_0005);
        assert_eq!(ResourceHdl::from_raw(0x0002_0005), hdl);

        let stale = ResourceHdl::for_index_and_gen(5, Generation::ZERO);
        assert_ne!(stale, hdl);
    }

    #[test]
    fn generation_wraps() {
        let mut gen = Generation::ZERO;
        for _ in 0..=u16::MAX {
            gen = gen.next();
        }
        assert_eq!(gen, Generation::ZERO);
    }

    #[test]
    fn invalid_handle_index_is_out_of_any_table() {
        assert_eq!(ResourceHdl::INVALID.index(), 0xffff);
    }

    #[test]
    fn every_fault_is_eperm() {
        for fault in [
            Fault::InvalidHandle,
            Fault::Unsupported,
            Fault::Bus(BusError::Timeout),
            Fault::OutOfBounds {
                ofs: 250,
                len: 10,
                size: 256,
            },
            Fault::NoMessage,
        ] {
            let e = SdiError::from(fault);
            assert_eq!(e, SdiError::NotPermitted);
            assert_eq!(e.errno(), 1);
            assert_eq!(u32::from(e), 1);
        }
    }

    #[test]
    fn missing_register_means_unsupported() {
        assert_eq!(Fault::from(BusError::NoRegister), Fault::Unsupported);
        assert_eq!(Fault::from(BusError::Nack), Fault::Bus(BusError::Nack));
    }

    #[test]
    fn raw_codes_decode() {
        assert_eq!(BusError::from_u32(6), Some(BusError::Timeout));
        assert_eq!(BusError::from_u32(0), None);
        assert_eq!(ResourceKind::from_u8(3), Some(ResourceKind::Nvram));
        assert_eq!(SdiError::from_u32(1), Some(SdiError::NotPermitted));
    }

    #[test]
    fn platform_info_layout() {
        let tag = ServiceTag::try_from_str("7XQ2KC3").unwrap();
        let ver = FwVersion::try_from_str("3.12.1").unwrap();
        let info = PlatformInfo::new(&tag, &ver, 0x0102_0304);

        assert_eq!(info.service_tag(), b"7XQ2KC3");
        assert_eq!(info.comm_dev_fw_ver(), b"3.12.1");

        let bytes = info.as_bytes();
        assert_eq!(bytes.len(), 104);
        assert_eq!(&bytes[..7], b"7XQ2KC3");
        assert_eq!(bytes[SERVICE_TAG_SIZE], b'3');
        assert_eq!(&bytes[100..], &0x0102_0304u32.to_ne_bytes());

        let back = PlatformInfo::read_from_bytes(bytes).unwrap();
        assert_eq!(back, info);
    }
}
