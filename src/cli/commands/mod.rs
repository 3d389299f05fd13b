//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each handler validates its arguments, calls into the library and
//! formats the result on stdout. Failures are returned to `main`, which
//! prints them and exits non-zero.

mod config_cmd;
mod outcome;
mod status;

pub use config_cmd::{check as config_check, show as config_show};
pub use outcome::{decode, encode};
pub use status::status;

use super::args::{Command, ConfigCommand, OutcomeCommand};
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Outcome { action } => match action {
            OutcomeCommand::Decode { payload, json } => decode(&payload, json),
            OutcomeCommand::Encode {
                status,
                message,
                code,
            } => encode(status, message.zip(code)),
        },
        Command::Status { code } => status(code),
        Command::Config { action } => match action {
            ConfigCommand::Show { path } => config_show(path.as_deref()),
            ConfigCommand::Check { path } => config_check(path.as_deref()),
        },
    }
}
