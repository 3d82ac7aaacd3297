pub mod activation;
pub mod fuse;
pub mod optimize;

use anyhow::Result;
use serde::Serialize;

/// Print a JSON summary to stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
