// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for page-programmed NVRAM.
//!
//! The part is addressed linearly from 0 to `size - 1`. Writes must not cross
//! a page boundary, so a buffer is written in chunks: the leading bytes up to
//! the first boundary, then whole pages, then whatever is left. Chunks that
//! already hold the right bytes are not rewritten.
//!
//! A write either lands completely or, if a chunk fails, the chunks written
//! before it are put back the way they were (as far as the part lets us) and
//! the original failure is returned.

use core::ops::Range;
use drv_sdi_api::{BusError, DeviceBus, Fault};
use ringbuf::*;

/// Largest page size the driver will sequence writes for.
pub const MAX_PAGE_SIZE: u32 = 256;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    OutOfBounds {
        ofs: u32,
        len: usize,
    },
    ReadFailed {
        ofs: u32,
        code: BusError,
    },
    WriteFailed {
        addr: u32,
        code: BusError,
    },
    Wrote {
        ofs: u32,
        len: usize,
        chunks_written: usize,
        chunks_skipped: usize,
    },
    Restored {
        chunks: usize,
    },
    RestoreFailed {
        addr: u32,
        code: BusError,
    },
}

ringbuf!(Trace, 32, Trace::None);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GeometryError {
    ZeroSize,
    /// Page size is not a power of two, or is larger than the part or
    /// [`MAX_PAGE_SIZE`].
    BadPageSize(u32),
}

pub struct Nvram<B> {
    bus: B,
    size: u32,
    page_size: u32,
}

/// Splits `ofs..ofs + len` at page boundaries, yielding each piece's device
/// address and its range relative to `ofs`.
struct Chunks {
    ofs: u32,
    page_size: u32,
    pos: usize,
    len: usize,
}

impl Iterator for Chunks {
    type Item = (u32, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.len {
            return None;
        }
        // The caller has bounds checked the range, so this cannot overflow.
        let addr = self.ofs + self.pos as u32;
        let room = (self.page_size - addr % self.page_size) as usize;
        let start = self.pos;
        self.pos += room.min(self.len - start);
        Some((addr, start..self.pos))
    }
}

impl<B: DeviceBus> Nvram<B> {
    pub fn new(
        bus: B,
        size: u32,
        page_size: u32,
    ) -> Result<Self, GeometryError> {
        if size == 0 {
            return Err(GeometryError::ZeroSize);
        }
        if !page_size.is_power_of_two()
            || page_size > MAX_PAGE_SIZE
            || page_size > size
        {
            return Err(GeometryError::BadPageSize(page_size));
        }
        Ok(Self {
            bus,
            size,
            page_size,
        })
    }

    /// Total addressable bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    fn bounds_check(&self, ofs: u32, len: usize) -> Result<(), Fault> {
        match (ofs as usize).checked_add(len) {
            Some(end) if end <= self.size as usize => Ok(()),
            _ => {
                ringbuf_entry!(Trace::OutOfBounds { ofs, len });
                Err(Fault::OutOfBounds {
                    ofs,
                    len,
                    size: self.size,
                })
            }
        }
    }

    fn chunks(&self, ofs: u32, len: usize) -> Chunks {
        Chunks {
            ofs,
            page_size: self.page_size,
            pos: 0,
            len,
        }
    }

    /// Fills `buf` from `ofs` onwards.
    ///
    /// Nothing is read unless the whole range lies within the part.
    pub fn read(&self, buf: &mut [u8], ofs: u32) -> Result<(), Fault> {
        self.bounds_check(ofs, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        self.bus.read(ofs, buf).map_err(|code| {
            ringbuf_entry!(Trace::ReadFailed { ofs, code });
            Fault::from(code)
        })
    }

    /// Writes `data` at `ofs`.
    ///
    /// Nothing is written unless the whole range lies within the part.
    pub fn write(&self, data: &[u8], ofs: u32) -> Result<(), Fault> {
        self.bounds_check(ofs, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        let mut before = vec![0u8; data.len()];
        self.read(&mut before, ofs)?;

        let mut chunks_written = 0;
        let mut chunks_skipped = 0;
        for (addr, range) in self.chunks(ofs, data.len()) {
            let chunk = &data[range.clone()];
            if chunk == &before[range.clone()] {
                chunks_skipped += 1;
                continue;
            }
            if let Err(code) = self.bus.write(addr, chunk) {
                ringbuf_entry!(Trace::WriteFailed { addr, code });
                let done = range.start;
                self.restore(ofs, &before[..done], &data[..done]);
                return Err(Fault::from(code));
            }
            chunks_written += 1;
        }

        ringbuf_entry!(Trace::Wrote {
            ofs,
            len: data.len(),
            chunks_written,
            chunks_skipped,
        });
        Ok(())
    }

    /// Puts back `before` over the chunks of `ofs..` that were changed to
    /// `after`. Failures are traced and otherwise ignored.
    fn restore(&self, ofs: u32, before: &[u8], after: &[u8]) {
        let mut chunks = 0;
        for (addr, range) in self.chunks(ofs, before.len()) {
            let old = &before[range.clone()];
            if old == &after[range] {
                continue;
            }
            match self.bus.write(addr, old) {
                Ok(()) => chunks += 1,
                Err(code) => {
                    ringbuf_entry!(Trace::RestoreFailed { addr, code });
                }
            }
        }
        ringbuf_entry!(Trace::Restored { chunks });
    }
}
