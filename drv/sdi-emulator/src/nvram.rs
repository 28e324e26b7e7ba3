// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use drv_sdi_api::{BusError, DeviceBus};
use std::ops::Range;
use std::sync::Arc;

struct State {
    mem: Vec<u8>,
    page_size: usize,
    write_cycles: usize,
    writes_left: Option<usize>,
    fault: Option<BusError>,
}

impl State {
    fn range(&self, addr: u32, len: usize) -> Result<Range<usize>, BusError> {
        if let Some(e) = self.fault {
            return Err(e);
        }
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.mem.len() => Ok(start..end),
            _ => Err(BusError::BadArg),
        }
    }
}

/// Bus side of an emulated page-programmed NVRAM part.
///
/// Like a real EEPROM, a single write may not cross a page boundary; one that
/// tries is refused rather than wrapped.
pub struct EmulatedNvram {
    state: Arc<spin::Mutex<State>>,
}

#[derive(Clone)]
pub struct NvramPort {
    state: Arc<spin::Mutex<State>>,
}

impl EmulatedNvram {
    /// Creates an erased part of `size` bytes. `page_size` must be nonzero.
    pub fn new(size: u32, page_size: u32) -> (Self, NvramPort) {
        let state = Arc::new(spin::Mutex::new(State {
            mem: vec![0xff; size as usize],
            page_size: (page_size as usize).max(1),
            write_cycles: 0,
            writes_left: None,
            fault: None,
        }));
        (
            Self {
                state: state.clone(),
            },
            NvramPort { state },
        )
    }
}

impl DeviceBus for EmulatedNvram {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), BusError> {
        let s = self.state.lock();
        let range = s.range(addr, buf.len())?;
        buf.copy_from_slice(&s.mem[range]);
        Ok(())
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<(), BusError> {
        let mut s = self.state.lock();
        let range = s.range(addr, data.len())?;
        if range.start % s.page_size + data.len() > s.page_size {
            return Err(BusError::BadArg);
        }
        let writes_left = s.writes_left;
        match writes_left {
            Some(0) => {
                s.writes_left = None;
                return Err(BusError::Nack);
            }
            Some(n) => s.writes_left = Some(n - 1),
            None => (),
        }
        s.mem[range].copy_from_slice(data);
        s.write_cycles += 1;
        Ok(())
    }
}

impl NvramPort {
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().mem.clone()
    }

    /// Number of successful write transfers so far.
    pub fn write_cycles(&self) -> usize {
        self.state.lock().write_cycles
    }

    /// Lets `n` more writes through, then NACKs the one after that. Writes
    /// succeed again from then on. `None` cancels a pending failure.
    pub fn fail_after_writes(&self, n: Option<usize>) {
        self.state.lock().writes_left = n;
    }

    pub fn inject_fault(&self, fault: Option<BusError>) {
        self.state.lock().fault = fault;
    }
}
