//! Command-line interface for espresso-forge.
//!
//! Provides commands for running pipelines and single stages, scanning
//! solver output and rendering input decks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
