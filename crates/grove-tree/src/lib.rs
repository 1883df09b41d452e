//! Disk-resident B+Tree multimap for Grove.
//!
//! This crate provides:
//! - Tree order (fanout) derivation from a page-size budget
//! - Fixed-size node records with leaf-chain threading
//! - The B+Tree engine: insert with splitting, remove with
//!   borrowing/merging, ordered key lookups and full scans
//!
//! Keys and values are any [`grove_common::FixedCodec`] types; duplicate keys
//! are permitted and each exact (key, value) pair is stored once.

mod node;
mod order;
mod tree;

pub use order::NodeOrder;
pub use tree::{BPlusTree, TreeStats};

pub use grove_common::{FixedStr, GroveError, Result, TreeConfig};
