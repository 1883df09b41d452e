//! On-disk node layout: entries, child positions and the leaf chain.

use bytes::{Buf, BufMut};
use grove_common::{FixedCodec, RecordCodec};

/// Sentinel for "no next leaf" in the serialized leaf chain.
pub(crate) const NO_NEXT: u32 = u32::MAX;

const TAG_LEAF: u8 = 0;
const TAG_INTERNAL: u8 = 1;

/// One (key, value) pair.
///
/// Entries order by key first, then by value, so equal keys coexist and an
/// exact pair is found by binary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

impl<K: FixedCodec, V: FixedCodec> Entry<K, V> {
    fn encode(&self, buf: &mut impl BufMut) {
        self.key.encode(buf);
        self.value.encode(buf);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            key: K::decode(buf),
            value: V::decode(buf),
        }
    }
}

/// A single tree node, decoded.
///
/// Leaves hold entries and thread to the next leaf in key order; internal
/// nodes hold separator entries and one more child position than entries.
/// Child `i` covers pairs strictly below separator `i` and child `i + 1`
/// starts at or above it; a separator equals the right subtree's first pair
/// when created and may lag behind later removals.
#[derive(Debug, Clone)]
pub(crate) struct Node<K, V> {
    pub is_leaf: bool,
    pub entries: Vec<Entry<K, V>>,
    /// Child record ordinals; empty for leaves.
    pub children: Vec<u32>,
    /// Next leaf in ascending key order; `None` for the last leaf and for
    /// internal nodes.
    pub next: Option<u32>,
}

impl<K, V> Node<K, V> {
    pub fn new_leaf() -> Self {
        Self {
            is_leaf: true,
            entries: Vec::new(),
            children: Vec::new(),
            next: None,
        }
    }

    pub fn new_internal() -> Self {
        Self {
            is_leaf: false,
            entries: Vec::new(),
            children: Vec::new(),
            next: None,
        }
    }
}

// Layout: tag u8, entry count u16 LE, next u32 LE, then `count` entries,
// then `count + 1` child ordinals for internal nodes. The remainder of the
// fixed-size record is padding.
impl<K, V> RecordCodec for Node<K, V>
where
    K: FixedCodec + Clone,
    V: FixedCodec + Clone,
{
    fn encode_record(&self, buf: &mut [u8]) {
        let mut cur = &mut buf[..];
        cur.put_u8(if self.is_leaf { TAG_LEAF } else { TAG_INTERNAL });
        cur.put_u16_le(self.entries.len() as u16);
        cur.put_u32_le(self.next.unwrap_or(NO_NEXT));
        for entry in &self.entries {
            entry.encode(&mut cur);
        }
        for &child in &self.children {
            cur.put_u32_le(child);
        }
    }

    fn decode_record(buf: &[u8]) -> Self {
        let mut cur = buf;
        let is_leaf = cur.get_u8() == TAG_LEAF;
        let count = cur.get_u16_le() as usize;
        let next = match cur.get_u32_le() {
            NO_NEXT => None,
            n => Some(n),
        };

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(Entry::decode(&mut cur));
        }

        let mut children = Vec::new();
        if !is_leaf {
            children.reserve(count + 1);
            for _ in 0..count + 1 {
                children.push(cur.get_u32_le());
            }
        }

        Self {
            is_leaf,
            entries,
            children,
            next: if is_leaf { next } else { None },
        }
    }
}
