// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use drv_sdi_api::regs::comm_dev::{Register, Status, NB_ACK};
use drv_sdi_api::{
    BusError, DeviceBus, FwVersion, ServiceTag, BUFFER_MAX_SIZE,
    FW_VERSION_SIZE, SERVICE_TAG_SIZE,
};
use num_traits::FromPrimitive;
use std::collections::VecDeque;
use std::sync::Arc;

/// Number of northbound messages the controller can have outstanding.
pub const NB_QUEUE_DEPTH: usize = 16;

#[derive(Clone, Debug)]
pub struct CommDevParams {
    pub service_tag: ServiceTag,
    pub fw_version: FwVersion,
    pub slot_occupation: u32,
    /// Southbound messages the controller buffers before it stops reporting
    /// `SB_READY`.
    pub sb_queue_depth: usize,
    /// Echo every southbound message back northbound.
    pub loopback: bool,
    /// Registers this hardware variant does not implement.
    pub unsupported: Vec<Register>,
}

impl Default for CommDevParams {
    fn default() -> Self {
        Self {
            service_tag: ServiceTag::empty(),
            fw_version: FwVersion::empty(),
            slot_occupation: 0,
            sb_queue_depth: 1,
            loopback: false,
            unsupported: Vec::new(),
        }
    }
}

/// Errors from the controller side of an emulated Comm_Dev.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortError {
    /// The northbound queue is full.
    QueueFull,
    /// The message exceeds the mailbox capacity.
    Oversize,
}

struct State {
    service_tag: [u8; SERVICE_TAG_SIZE],
    fw_version: [u8; FW_VERSION_SIZE],
    slot_occupation: u32,
    host_sw_version: [u8; FW_VERSION_SIZE],
    host_temperature: Option<i32>,
    northbound: VecDeque<Vec<u8>>,
    southbound: VecDeque<Vec<u8>>,
    sb_queue_depth: usize,
    loopback: bool,
    accepting: bool,
    unsupported: Vec<Register>,
    fault: Option<BusError>,
    received: usize,
    transfers: usize,
}

impl State {
    fn status(&self) -> Status {
        let mut status = Status::empty();
        if !self.northbound.is_empty() {
            status |= Status::MSG_PRESENT;
        }
        let sb_room = self.southbound.len() < self.sb_queue_depth;
        let nb_room = !self.loopback || self.northbound.len() < NB_QUEUE_DEPTH;
        if self.accepting && sb_room && nb_room {
            status |= Status::SB_READY;
        }
        status
    }

    /// Common checks for every transfer; returns the decoded register.
    fn begin(&mut self, addr: u32) -> Result<Register, BusError> {
        self.transfers += 1;
        if let Some(e) = self.fault {
            return Err(e);
        }
        let reg = Register::from_u32(addr).ok_or(BusError::NoRegister)?;
        if self.unsupported.contains(&reg) {
            return Err(BusError::NoRegister);
        }
        Ok(reg)
    }
}

fn check_width(reg: Register, len: usize) -> Result<(), BusError> {
    match reg.width() {
        Some(w) if w != len => Err(BusError::BadArg),
        _ => Ok(()),
    }
}

/// Bus side of an emulated Comm_Dev.
pub struct EmulatedCommDev {
    state: Arc<spin::Mutex<State>>,
}

/// Controller side of an emulated Comm_Dev.
#[derive(Clone)]
pub struct ControllerPort {
    state: Arc<spin::Mutex<State>>,
}

impl EmulatedCommDev {
    pub fn new(params: CommDevParams) -> (Self, ControllerPort) {
        let state = Arc::new(spin::Mutex::new(State {
            service_tag: params.service_tag.to_register(),
            fw_version: params.fw_version.to_register(),
            slot_occupation: params.slot_occupation,
            host_sw_version: [0; FW_VERSION_SIZE],
            host_temperature: None,
            northbound: VecDeque::new(),
            southbound: VecDeque::new(),
            sb_queue_depth: params.sb_queue_depth,
            loopback: params.loopback,
            accepting: true,
            unsupported: params.unsupported,
            fault: None,
            received: 0,
            transfers: 0,
        }));
        (
            Self {
                state: state.clone(),
            },
            ControllerPort { state },
        )
    }
}

impl DeviceBus for EmulatedCommDev {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let mut s = self.state.lock();
        let reg = s.begin(addr)?;
        check_width(reg, buf.len())?;

        match reg {
            Register::ServiceTag => buf.copy_from_slice(&s.service_tag),
            Register::CommDevFwVersion => buf.copy_from_slice(&s.fw_version),
            Register::HostSwVersion => buf.copy_from_slice(&s.host_sw_version),
            Register::SlotOccupation => {
                buf.copy_from_slice(&s.slot_occupation.to_le_bytes())
            }
            Register::Status => buf[0] = s.status().bits(),
            Register::NbLength => {
                let len = s.northbound.front().map_or(0, Vec::len);
                buf.copy_from_slice(&(len as u16).to_le_bytes());
            }
            Register::NbData => match s.northbound.front() {
                Some(msg) if msg.len() == buf.len() => {
                    buf.copy_from_slice(msg)
                }
                _ => return Err(BusError::BadArg),
            },
            Register::HostTemperature
            | Register::NbAck
            | Register::SbData => return Err(BusError::BadArg),
        }
        Ok(())
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        let mut s = self.state.lock();
        let reg = s.begin(addr)?;
        check_width(reg, data.len())?;

        match reg {
            Register::HostSwVersion => s.host_sw_version.copy_from_slice(data),
            Register::HostTemperature => {
                let mut raw = [0; 4];
                raw.copy_from_slice(data);
                s.host_temperature = Some(i32::from_le_bytes(raw));
            }
            Register::NbAck => {
                if data[0] != NB_ACK {
                    return Err(BusError::BadArg);
                }
                if s.northbound.pop_front().is_none() {
                    return Err(BusError::Nack);
                }
            }
            Register::SbData => {
                if data.len() > BUFFER_MAX_SIZE {
                    return Err(BusError::BadArg);
                }
                if !s.status().contains(Status::SB_READY) {
                    return Err(BusError::Nack);
                }
                s.southbound.push_back(data.to_vec());
                if s.loopback {
                    s.northbound.push_back(data.to_vec());
                }
            }
            Register::ServiceTag
            | Register::CommDevFwVersion
            | Register::SlotOccupation
            | Register::Status
            | Register::NbLength
            | Register::NbData => return Err(BusError::BadArg),
        }
        Ok(())
    }
}

impl ControllerPort {
    /// Takes the oldest southbound message, if any.
    pub fn receive(&self) -> Option<Vec<u8>> {
        let mut s = self.state.lock();
        let msg = s.southbound.pop_front()?;
        s.received += 1;
        Some(msg)
    }

    /// Total number of southbound messages taken with [`Self::receive`].
    pub fn received_count(&self) -> usize {
        self.state.lock().received
    }

    /// Southbound messages delivered but not yet received.
    pub fn southbound_pending(&self) -> usize {
        self.state.lock().southbound.len()
    }

    /// Queues a northbound message for the host.
    pub fn send(&self, msg: &[u8]) -> Result<(), PortError> {
        if msg.len() > BUFFER_MAX_SIZE {
            return Err(PortError::Oversize);
        }
        let mut s = self.state.lock();
        if s.northbound.len() >= NB_QUEUE_DEPTH {
            return Err(PortError::QueueFull);
        }
        s.northbound.push_back(msg.to_vec());
        Ok(())
    }

    /// Northbound messages not yet drained by the host.
    pub fn northbound_pending(&self) -> usize {
        self.state.lock().northbound.len()
    }

    /// Last software version the host reported, if it decodes.
    pub fn host_sw_version(&self) -> Option<FwVersion> {
        FwVersion::from_register(&self.state.lock().host_sw_version).ok()
    }

    /// Last temperature the host reported.
    pub fn host_temperature(&self) -> Option<i32> {
        self.state.lock().host_temperature
    }

    /// While `false`, the controller never reports `SB_READY`.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    /// Makes every subsequent bus transfer fail with `fault`, until cleared
    /// with `None`.
    pub fn inject_fault(&self, fault: Option<BusError>) {
        self.state.lock().fault = fault;
    }

    /// Overwrites the raw service tag register, terminator and all.
    pub fn set_service_tag_image(&self, raw: [u8; SERVICE_TAG_SIZE]) {
        self.state.lock().service_tag = raw;
    }

    /// Number of bus transfers attempted against the device, including
    /// failed ones.
    pub fn bus_transfers(&self) -> usize {
        self.state.lock().transfers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(params: CommDevParams) -> (EmulatedCommDev, ControllerPort) {
        EmulatedCommDev::new(params)
    }

    fn status(dev: &EmulatedCommDev) -> Status {
        let mut raw = [0];
        dev.read(Register::Status as u32, &mut raw).unwrap();
        Status::from_bits_truncate(raw[0])
    }

    #[test]
    fn string_registers_are_fixed_width() {
        let (dev, _port) = device(CommDevParams {
            service_tag: ServiceTag::try_from_str("ABC1234").unwrap(),
            ..Default::default()
        });

        let mut tag = [0xaa; SERVICE_TAG_SIZE];
        dev.read(Register::ServiceTag as u32, &mut tag).unwrap();
        assert_eq!(&tag[..8], b"ABC1234\0");
        assert!(tag[8..].iter().all(|&b| b == 0));

        let mut short = [0; 8];
        assert_eq!(
            dev.read(Register::ServiceTag as u32, &mut short),
            Err(BusError::BadArg)
        );
    }

    #[test]
    fn northbound_drains_on_ack() {
        let (dev, port) = device(CommDevParams::default());
        assert!(!status(&dev).contains(Status::MSG_PRESENT));

        port.send(b"hello").unwrap();
        assert!(status(&dev).contains(Status::MSG_PRESENT));

        let mut len = [0; 2];
        dev.read(Register::NbLength as u32, &mut len).unwrap();
        assert_eq!(u16::from_le_bytes(len), 5);

        let mut data = [0; 5];
        dev.read(Register::NbData as u32, &mut data).unwrap();
        assert_eq!(&data, b"hello");

        dev.write(Register::NbAck as u32, &[NB_ACK]).unwrap();
        assert!(!status(&dev).contains(Status::MSG_PRESENT));
        assert_eq!(
            dev.write(Register::NbAck as u32, &[NB_ACK]),
            Err(BusError::Nack)
        );
    }

    #[test]
    fn southbound_respects_queue_depth() {
        let (dev, port) = device(CommDevParams {
            sb_queue_depth: 2,
            ..Default::default()
        });
        let sb = Register::SbData as u32;

        dev.write(sb, b"one").unwrap();
        assert!(status(&dev).contains(Status::SB_READY));
        dev.write(sb, b"two").unwrap();
        assert!(!status(&dev).contains(Status::SB_READY));
        assert_eq!(dev.write(sb, b"three"), Err(BusError::Nack));

        assert_eq!(port.receive().as_deref(), Some(&b"one"[..]));
        assert!(status(&dev).contains(Status::SB_READY));
        assert_eq!(port.received_count(), 1);
        assert_eq!(port.southbound_pending(), 1);
    }

    #[test]
    fn not_accepting_clears_ready() {
        let (dev, port) = device(CommDevParams::default());
        port.set_accepting(false);
        assert!(!status(&dev).contains(Status::SB_READY));
        assert_eq!(
            dev.write(Register::SbData as u32, b"x"),
            Err(BusError::Nack)
        );
        port.set_accepting(true);
        dev.write(Register::SbData as u32, b"x").unwrap();
    }

    #[test]
    fn loopback_echoes_southbound() {
        let (dev, port) = device(CommDevParams {
            loopback: true,
            ..Default::default()
        });
        dev.write(Register::SbData as u32, b"ping").unwrap();
        assert!(status(&dev).contains(Status::MSG_PRESENT));
        assert_eq!(port.northbound_pending(), 1);
        assert_eq!(port.southbound_pending(), 1);
    }

    #[test]
    fn unsupported_and_unknown_registers() {
        let (dev, _port) = device(CommDevParams {
            unsupported: vec![Register::HostTemperature],
            ..Default::default()
        });
        assert_eq!(
            dev.write(Register::HostTemperature as u32, &[0; 4]),
            Err(BusError::NoRegister)
        );
        assert_eq!(dev.read(0x7f, &mut [0]), Err(BusError::NoRegister));
    }

    #[test]
    fn injected_fault_fails_everything_until_cleared() {
        let (dev, port) = device(CommDevParams::default());
        port.inject_fault(Some(BusError::Timeout));
        assert_eq!(
            dev.read(Register::Status as u32, &mut [0]),
            Err(BusError::Timeout)
        );
        port.inject_fault(None);
        assert!(dev.read(Register::Status as u32, &mut [0]).is_ok());
        assert_eq!(port.bus_transfers(), 2);
    }

    #[test]
    fn port_rejects_oversize_and_overflow() {
        let (_dev, port) = device(CommDevParams::default());
        assert_eq!(
            port.send(&[0; BUFFER_MAX_SIZE + 1]),
            Err(PortError::Oversize)
        );
        for _ in 0..NB_QUEUE_DEPTH {
            port.send(b"m").unwrap();
        }
        assert_eq!(port.send(b"m"), Err(PortError::QueueFull));
    }

    #[test]
    fn host_reports_land_on_port() {
        let (dev, port) = device(CommDevParams::default());
        assert_eq!(port.host_temperature(), None);
        dev.write(Register::HostTemperature as u32, &(-12i32).to_le_bytes())
            .unwrap();
        assert_eq!(port.host_temperature(), Some(-12));

        let ver = FwVersion::try_from_str("1.2.3").unwrap();
        dev.write(Register::HostSwVersion as u32, &ver.to_register())
            .unwrap();
        assert_eq!(port.host_sw_version(), Some(ver));
    }

    #[test]
    fn read_only_registers_refuse_writes() {
        let (dev, _port) = device(CommDevParams::default());
        assert_eq!(
            dev.write(Register::Status as u32, &[0xff]),
            Err(BusError::BadArg)
        );
        assert_eq!(
            dev.read(Register::SbData as u32, &mut [0; 4]),
            Err(BusError::BadArg)
        );
    }
}
