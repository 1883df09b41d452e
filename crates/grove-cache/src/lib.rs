//! Node cache for Grove.
//!
//! This crate provides a fixed-capacity, write-through cache of decoded
//! records layered over the paged record store.

mod cache;

pub use cache::NodeCache;
