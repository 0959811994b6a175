//! Subcommand implementations.

pub mod config;
pub mod demo;
pub mod serve;
pub mod session;

use std::fmt::Display;

use serde::Serialize;

use crate::error::ClientResult;

/// Prints one result line, as JSON when `json` is set.
pub(crate) fn emit<T: Serialize>(record: &T, text: impl Display, json: bool) -> ClientResult<()> {
    if json {
        let line = serde_json::to_string(record).map_err(std::io::Error::from)?;
        println!("{}", line);
    } else {
        println!("{}", text);
    }
    Ok(())
}
