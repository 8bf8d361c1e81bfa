//! # aspect
//!
//! Command-line front end of the aspect model linker: configuration,
//! JSON statement documents and the CLI commands.

pub mod cli;
pub mod config;
pub mod document;
