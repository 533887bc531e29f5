//! Command-line interface for skillbench.
//!
//! Provides commands for running evaluations, validating configs and
//! reprinting finished runs.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
