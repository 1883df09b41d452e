//! Fixed-size serialization traits.
//!
//! Everything the tree persists has a size known up front: keys and values
//! encode to exactly `SIZE` bytes, and whole node records encode into the
//! store's fixed record size. Both traits work over `bytes` cursors.

use bytes::{Buf, BufMut};

/// A value with a fixed serialized size.
///
/// `encode` must write exactly `SIZE` bytes and `decode` must consume exactly
/// `SIZE` bytes, so entries can be laid out back to back inside a record.
pub trait FixedCodec: Sized {
    /// Serialized size in bytes.
    const SIZE: usize;

    /// Writes this value to the buffer.
    fn encode(&self, buf: &mut impl BufMut);

    /// Reads a value from the buffer.
    fn decode(buf: &mut impl Buf) -> Self;
}

macro_rules! impl_fixed_codec_int {
    ($($ty:ty => $put:ident, $get:ident);* $(;)?) => {
        $(
            impl FixedCodec for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn encode(&self, buf: &mut impl BufMut) {
                    buf.$put(*self);
                }

                #[inline]
                fn decode(buf: &mut impl Buf) -> Self {
                    buf.$get()
                }
            }
        )*
    };
}

impl_fixed_codec_int! {
    u8 => put_u8, get_u8;
    u16 => put_u16_le, get_u16_le;
    u32 => put_u32_le, get_u32_le;
    u64 => put_u64_le, get_u64_le;
    i32 => put_i32_le, get_i32_le;
    i64 => put_i64_le, get_i64_le;
}

impl<const N: usize> FixedCodec for [u8; N] {
    const SIZE: usize = N;

    #[inline]
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(self);
    }

    #[inline]
    fn decode(buf: &mut impl Buf) -> Self {
        let mut out = [0u8; N];
        buf.copy_to_slice(&mut out);
        out
    }
}

/// A value that serializes into a whole fixed-size store record.
///
/// `encode_record` receives a zeroed buffer of exactly the store's record
/// size; unused trailing bytes stay zero. `decode_record` reads back from the
/// same layout.
pub trait RecordCodec: Sized + Clone {
    /// Writes this value into the record buffer.
    fn encode_record(&self, buf: &mut [u8]);

    /// Reads a value from a record buffer.
    fn decode_record(buf: &[u8]) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: FixedCodec + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), T::SIZE);
        let decoded = T::decode(&mut buf.as_slice());
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_int_codecs() {
        roundtrip(0xABu8);
        roundtrip(0xABCDu16);
        roundtrip(0xDEAD_BEEFu32);
        roundtrip(u64::MAX);
        roundtrip(-42i32);
        roundtrip(i64::MIN);
    }

    #[test]
    fn test_array_codec() {
        roundtrip([1u8, 2, 3, 4, 5]);
        roundtrip([0u8; 0]);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(<u32 as FixedCodec>::SIZE, 4);
        assert_eq!(<u64 as FixedCodec>::SIZE, 8);
        assert_eq!(<[u8; 16] as FixedCodec>::SIZE, 16);
    }

    #[test]
    fn test_sequential_layout() {
        // Two values encoded back to back decode in the same order.
        let mut buf = Vec::new();
        7u32.encode(&mut buf);
        9u64.encode(&mut buf);

        let mut cursor = buf.as_slice();
        assert_eq!(u32::decode(&mut cursor), 7);
        assert_eq!(u64::decode(&mut cursor), 9);
        assert!(cursor.is_empty());
    }
}
