//! Fixed-capacity string type for tree keys.

use crate::codec::FixedCodec;
use bytes::{Buf, BufMut};

/// A fixed-capacity, NUL-padded string.
///
/// Stores up to `N` bytes inline; shorter strings are padded with NUL bytes.
/// Ordering is bytewise, so NUL padding sorts a prefix before its extensions
/// and the type can serve directly as a tree key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedStr<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    /// Creates a FixedStr from a string slice.
    ///
    /// # Panics
    /// Panics if `s` is longer than `N` bytes.
    pub fn new(s: &str) -> Self {
        assert!(s.len() <= N, "string longer than FixedStr capacity");
        let mut bytes = [0u8; N];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Self { bytes }
    }

    /// Returns the string content with NUL padding stripped, or `None` if
    /// the bytes are not valid UTF-8 (for example after reading a corrupt
    /// record). `Display`/`Debug` render such content lossily instead.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.trimmed()).ok()
    }

    fn trimmed(&self) -> &[u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(N);
        &self.bytes[..end]
    }

    /// Returns the raw padded bytes.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Returns true if the string is empty.
    pub fn is_empty(&self) -> bool {
        N == 0 || self.bytes[0] == 0
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self { bytes: [0u8; N] }
    }
}

impl<const N: usize> From<&str> for FixedStr<N> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> std::fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.trimmed()))
    }
}

impl<const N: usize> std::fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedStr({:?})", String::from_utf8_lossy(self.trimmed()))
    }
}

impl<const N: usize> FixedCodec for FixedStr<N> {
    const SIZE: usize = N;

    #[inline]
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.bytes);
    }

    #[inline]
    fn decode(buf: &mut impl Buf) -> Self {
        let mut bytes = [0u8; N];
        buf.copy_to_slice(&mut bytes);
        Self { bytes }
    }
}
