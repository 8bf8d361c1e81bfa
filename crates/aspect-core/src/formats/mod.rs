//! # Formats Module
//!
//! Binary snapshot format for statement stores.
//!
//! The format is defined here; file I/O lives in the binary.

mod persistence;

pub use persistence::*;
