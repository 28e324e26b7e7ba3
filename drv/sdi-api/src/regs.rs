// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register maps shared by the drivers and anything that emulates the
//! hardware.

/// Comm_Dev registers.
///
/// Multi-byte integers are little-endian. String registers are fixed-width
/// and NUL-terminated.
pub mod comm_dev {
    use crate::{BUFFER_MAX_SIZE, FW_VERSION_SIZE, SERVICE_TAG_SIZE};
    use num_derive::FromPrimitive;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
    pub enum Register {
        /// Chassis service tag (RO)
        ServiceTag = 0x00,
        /// Comm_Dev firmware version (RO)
        CommDevFwVersion = 0x01,
        /// Slot occupied by this host system (RO)
        SlotOccupation = 0x02,
        /// Host system software version (RW)
        HostSwVersion = 0x03,
        /// Host temperature reading, signed (WO)
        HostTemperature = 0x04,
        /// Mailbox status, see [`Status`] (RO)
        Status = 0x05,
        /// Length of the pending northbound message (RO)
        NbLength = 0x06,
        /// Pending northbound message data (RO)
        NbData = 0x07,
        /// Writing 1 drains the pending northbound message (WO)
        NbAck = 0x08,
        /// Southbound message; the length of the write is the length of the
        /// message (WO)
        SbData = 0x09,
    }

    impl Register {
        /// Fixed width of the register, or `None` for the variable-length
        /// data registers.
        pub const fn width(self) -> Option<usize> {
            match self {
                Self::ServiceTag => Some(SERVICE_TAG_SIZE),
                Self::CommDevFwVersion | Self::HostSwVersion => {
                    Some(FW_VERSION_SIZE)
                }
                Self::SlotOccupation | Self::HostTemperature => Some(4),
                Self::Status | Self::NbAck => Some(1),
                Self::NbLength => Some(2),
                Self::NbData | Self::SbData => None,
            }
        }

        /// Largest transfer the register accepts.
        pub const fn max_len(self) -> usize {
            match self.width() {
                Some(w) => w,
                None => BUFFER_MAX_SIZE,
            }
        }
    }

    bitflags::bitflags! {
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub struct Status: u8 {
            /// A northbound message is waiting in `NbData`.
            const MSG_PRESENT = 1 << 0;
            /// The controller will accept a southbound message.
            const SB_READY = 1 << 1;
        }
    }

    /// Value written to [`Register::NbAck`].
    pub const NB_ACK: u8 = 1;
}

/// Host system (board CPLD) registers.
pub mod host_system {
    use num_derive::FromPrimitive;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
    pub enum Register {
        /// Physical slot of this board in the chassis (RO, u8)
        SlotPosition = 0x00,
        /// Boot-complete flag, 0 or 1 (RW, u8)
        Booted = 0x01,
    }
}
