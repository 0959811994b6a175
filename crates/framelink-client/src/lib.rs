//! Client driver, CLI and configuration
//!
//! This crate provides [`FrameClient`] and the `framelink` command-line
//! interface.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use client::{FrameClient, Response, ResponseRecord};
pub use error::{ClientError, ClientResult};
