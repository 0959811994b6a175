//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// framelink - framed TCP sessions with async server push
#[derive(Debug, Parser)]
#[command(name = "framelink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FRAMELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Print responses as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Server address (overrides the config file)
    #[arg(long, short, env = "FRAMELINK_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Connection timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server in the foreground
    Serve {
        /// Idle read timeout in milliseconds
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Directory uploads are written to
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Submit each line read from stdin as an async message
        #[arg(long)]
        stdin_messages: bool,
    },

    /// Send a ping and wait for the pong
    Ping {
        /// Number of pings to send
        #[arg(long, default_value = "1")]
        count: u32,
    },

    /// Send a message and print the echo
    Echo {
        /// Message to echo
        message: String,
    },

    /// Upload a file
    Upload {
        /// File to upload
        path: PathBuf,
    },

    /// Print async messages pushed by the server
    Listen {
        /// Stop after this many messages
        #[arg(long)]
        count: Option<usize>,
    },

    /// Run a ping, echo, upload and async push against an in-process server
    Demo {
        /// File to upload
        file: PathBuf,

        /// Directory the in-process server writes uploads to
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
