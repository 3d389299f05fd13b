//! status command - Retryability of a status code

use crate::core::status::is_retryable_status;
use anyhow::Result;

pub fn status(code: u16) -> Result<()> {
    if is_retryable_status(Some(code)) {
        println!("{}: retryable", code);
    } else {
        println!("{}: not retryable", code);
    }
    Ok(())
}
