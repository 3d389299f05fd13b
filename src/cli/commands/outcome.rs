//! outcome command - Encode or decode cached outcome strings

use crate::core::outcome::CachedOutcome;
use anyhow::{Context, Result};

/// Decode a cached outcome and print it.
pub fn decode(payload: &str, json: bool) -> Result<()> {
    let outcome = CachedOutcome::decode(payload).context("Failed to decode cached outcome")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match &outcome {
        CachedOutcome::Success { status } => {
            println!("type:    success");
            println!("status:  {}", status);
        }
        CachedOutcome::Error {
            status,
            message,
            code,
        } => {
            println!("type:    error");
            println!("status:  {}", status);
            println!("message: {}", message);
            println!("code:    {}", code);
        }
    }
    Ok(())
}

/// Encode an outcome and print it. An error outcome needs a message and code.
pub fn encode(status: u16, error: Option<(String, String)>) -> Result<()> {
    let outcome = match error {
        Some((message, code)) => CachedOutcome::Error {
            status,
            message,
            code,
        },
        None => CachedOutcome::Success { status },
    };
    println!("{}", outcome.encode());
    Ok(())
}
