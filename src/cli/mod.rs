// src/cli/mod.rs
//! Command-line interface
//!
//! `start` mines against the configured pool, `benchmark` runs the full
//! engine against a synthetic job, `config` writes a template.

/// Clap command and option definitions
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, StartOptions};
