//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Latch - inspect cached outcomes, status classification and configuration
#[derive(Parser, Debug)]
#[command(name = "latch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode or decode cached outcome strings
    #[command(
        after_help = "\
EXAMPLES:
    latch outcome decode '1:-:400:-:Bad Request:-:400'
    latch outcome decode '0:-:200' --json
    latch outcome encode --status 404 --message 'Not Found' --code 404"
    )]
    Outcome {
        #[command(subcommand)]
        action: OutcomeCommand,
    },

    /// Tell whether a status code is worth retrying
    Status {
        /// HTTP-like status code
        code: u16,
    },

    /// Show or validate the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

/// `latch outcome` subcommands.
#[derive(Subcommand, Debug)]
pub enum OutcomeCommand {
    /// Decode a cached outcome string
    Decode {
        /// Encoded outcome, e.g. `0:-:200`
        payload: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encode a cached outcome string
    Encode {
        /// HTTP-like status
        #[arg(long)]
        status: u16,

        /// Error message; makes this an error outcome
        #[arg(long, requires = "code")]
        message: Option<String>,

        /// Error code
        #[arg(long, requires = "message")]
        code: Option<String>,
    },
}

/// `latch config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show {
        /// Config file (default: $LATCHWORK_CONFIG or the user config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Validate the configuration file
    Check {
        /// Config file (default: $LATCHWORK_CONFIG or the user config dir)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn encode_requires_message_and_code_together() {
        let parsed = Cli::try_parse_from(["latch", "outcome", "encode", "--status", "400", "--message", "x"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["latch", "outcome", "encode", "--status", "200"]).unwrap();
        assert!(matches!(
            parsed.command,
            Command::Outcome {
                action: OutcomeCommand::Encode { status: 200, message: None, code: None }
            }
        ));
    }

    #[test]
    fn debug_flag_is_global() {
        let parsed = Cli::try_parse_from(["latch", "status", "429", "--debug"]).unwrap();
        assert!(parsed.debug);
    }
}
