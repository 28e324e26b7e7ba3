// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffers for the SDI drivers
//!
//! Every driver module records what it did (and what went wrong) into a
//! static, fixed-size ring of `Copy` events rather than formatting log lines.
//! The ring is cheap enough to leave enabled in production and can be dumped
//! from a debugger, or snapshotted by a test that wants to assert that a
//! particular fault was traced.
//!
//! Unlike a single-task ring, these rings are shared by every thread that
//! calls into a driver, so each one sits behind a `spin::Mutex`. The lock is
//! held only for the duration of a single insertion.
//!
//! ## Constraints
//!
//! The payload type must implement both `Copy` and `PartialEq`.
//!
//! If you use the variants of the macros that leave the name of the ring
//! implicit, you can only have one per module.
//!
//! ## Creating a ring buffer
//!
//! ```
//! # use ringbuf::*;
//! #[derive(Copy, Clone, PartialEq)]
//! enum Trace {
//!     None,
//!     Flushed(usize),
//! }
//!
//! ringbuf!(Trace, 16, Trace::None);
//!
//! ringbuf_entry!(Trace::Flushed(12));
//! ```
//!
//! A name may be given to distinguish several rings in one module:
//!
//! ```
//! # use ringbuf::*;
//! ringbuf!(NVRAM_RINGBUF, u32, 16, 0);
//! ringbuf_entry!(NVRAM_RINGBUF, 0x200);
//! ```
//!
//! ## Coalescing
//!
//! When an entry is recorded with the same `line` and `payload` as the most
//! recent entry, the `count` of that entry is bumped instead of consuming a
//! new slot. A poll loop that sees the same status a thousand times costs one
//! slot.

#![cfg_attr(not(test), no_std)]

/// Re-exported so that code generated by the macros can always find it.
pub use spin;

/// Declares a trace ring in the current module.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a static ring named `NAME`, holding
/// `N` entries of type `Type`, all initialized to `expr`. If the name is
/// omitted it defaults to `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::TraceRing<$t, $n> =
            $crate::TraceRing::new($init);
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

/// Records an entry in a trace ring declared with [`ringbuf!`].
///
/// `ringbuf_entry!(NAME, expr)` inserts `expr` into the ring called `NAME`;
/// without a name it defaults to `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before taking the ring's lock, so that a
        // payload expression that itself traces cannot deadlock.
        let (p, buf) = ($payload, &$buf);
        $crate::TraceRing::entry(buf, line!() as u16, p);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

/// A single trace entry.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// The unlocked ring itself. Normally reached through [`TraceRing`].
#[derive(Debug, Copy, Clone)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // Coalesce with the newest entry when we can. `get` also protects us
        // against a corrupt `last`, in which case we just start over at 0.
        let last = self.last.unwrap_or(usize::MAX);
        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(count) = ent.count.checked_add(1) {
                    ent.count = count;
                    return;
                }
            }
        }

        let ndx = match last.wrapping_add(1) {
            n if n >= N => 0,
            n => n,
        };

        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            payload,
            count: 1,
            generation: ent.generation.wrapping_add(1),
        };
        self.last = Some(ndx);
    }

    /// Iterates over recorded entries, oldest first. Slots that have never
    /// been written are skipped.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = match self.last {
            Some(last) if last + 1 < N => last + 1,
            _ => 0,
        };
        self.buffer[start..]
            .iter()
            .chain(self.buffer[..start].iter())
            .filter(|ent| ent.count != 0)
    }
}

/// A [`Ringbuf`] that can be shared between threads.
#[derive(Debug)]
pub struct TraceRing<T: Copy + PartialEq, const N: usize> {
    ring: spin::Mutex<Ringbuf<T, N>>,
}

impl<T: Copy + PartialEq, const N: usize> TraceRing<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            ring: spin::Mutex::new(Ringbuf::new(init)),
        }
    }

    pub fn entry(&self, line: u16, payload: T) {
        self.ring.lock().entry(line, payload);
    }

    /// Copies out the current contents of the ring.
    pub fn snapshot(&self) -> Ringbuf<T, N> {
        *self.ring.lock()
    }

    /// Returns `true` if any recorded entry satisfies `pred`.
    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.ring.lock().iter().any(|ent| pred(&ent.payload))
    }
}
