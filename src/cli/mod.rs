//! Command-line interface for gradeforge.
//!
//! Provides direct stage commands and job submission through the scheduler.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
