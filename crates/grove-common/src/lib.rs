//! Grove common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all Grove components.

pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use codec::{FixedCodec, RecordCodec};
pub use config::TreeConfig;
pub use error::{GroveError, Result};
pub use types::FixedStr;
