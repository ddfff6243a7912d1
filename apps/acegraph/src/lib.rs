//! # acegraph
//!
//! Library half of the acegraph binary: configuration loading and the CLI
//! commands, exposed so integration tests can drive them without a process.

pub mod cli;
pub mod config;
