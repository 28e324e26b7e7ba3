// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-size, NUL-terminated byte strings.
//!
//! The controller stores its strings in fixed-width registers that C code
//! reads as `char[N]`. A `CStrBuf<N>` therefore holds at most `N - 1` content
//! bytes and always has room for the terminator, so its register image is
//! valid for a C reader no matter what was put in it.

/// Errors from building a [`CStrBuf`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StringError {
    /// The content does not leave room for the terminator.
    TooLong,
    /// A register image contained no terminator.
    Unterminated,
    /// A `&str` contained an interior NUL, which C readers would truncate.
    InteriorNul,
}

#[derive(Copy, Clone)]
pub struct CStrBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> CStrBuf<N> {
    /// Maximum content length, excluding the terminator.
    pub const CAPACITY: usize = N - 1;

    pub const fn empty() -> Self {
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    /// Builds a string from caller-supplied bytes.
    ///
    /// The content is everything before the first NUL (or the whole slice if
    /// there is none); it must fit in [`Self::CAPACITY`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StringError> {
        let len = content_len(bytes);
        if len > Self::CAPACITY {
            return Err(StringError::TooLong);
        }
        let mut buf = [0; N];
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(Self { buf, len })
    }

    pub fn try_from_str(s: &str) -> Result<Self, StringError> {
        if s.as_bytes().contains(&0) {
            return Err(StringError::InteriorNul);
        }
        Self::from_bytes(s.as_bytes())
    }

    /// Decodes a raw register image, which must be terminated.
    pub fn from_register(raw: &[u8; N]) -> Result<Self, StringError> {
        if !raw.contains(&0) {
            return Err(StringError::Unterminated);
        }
        Self::from_bytes(raw)
    }

    /// Returns the zero-padded register image.
    pub const fn to_register(&self) -> [u8; N] {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Length of the content of a possibly-terminated byte string.
pub(crate) fn content_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

impl<const N: usize> Default for CStrBuf<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> AsRef<[u8]> for CStrBuf<N> {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl<const N: usize, T> PartialEq<T> for CStrBuf<N>
where
    T: AsRef<[u8]>,
{
    fn eq(&self, other: &T) -> bool {
        self.as_bytes() == other.as_ref()
    }
}

impl<const N: usize> Eq for CStrBuf<N> {}

impl<const N: usize> core::fmt::Debug for CStrBuf<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.as_str() {
            Some(s) => core::fmt::Debug::fmt(s, f),
            None => core::fmt::Debug::fmt(self.as_bytes(), f),
        }
    }
}
