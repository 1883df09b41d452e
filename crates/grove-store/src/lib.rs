//! Paged record store for Grove.
//!
//! This crate provides:
//! - A flat-file store of fixed-size records addressed by append ordinal
//! - A small bank of header integers for persisted engine state

mod record;

pub use record::RecordFile;
