//! cli
//!
//! Command-line interface for Latchwork.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Delegate to command handlers
//!
//! The CLI is an operator tool. It decodes cache entries found in a store,
//! answers whether a status would be retried, and shows the configuration
//! a process would run with. It never talks to a store itself.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, ConfigCommand, OutcomeCommand};

use anyhow::Result;

/// Run a parsed command line.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    commands::dispatch(cli.command)
}
