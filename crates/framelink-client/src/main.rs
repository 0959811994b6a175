//! framelink CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use framelink_client::cli::{Cli, Command, ConfigAction};
use framelink_client::commands::serve::ServeOptions;
use framelink_client::commands::session::Target;
use framelink_client::commands::{self, session};
use framelink_client::config::ClientConfig;
use framelink_client::error::{ClientError, ClientResult};
use framelink_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else if matches!(cli.command, Command::Serve { .. }) {
        TracingConfig::daemon()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config),
        None => ClientConfig::load().map_err(ClientError::Config),
    }
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<()> {
    let target = Target::resolve(&cli, &config);
    let json = cli.json;

    match cli.command {
        Command::Serve {
            idle_timeout,
            ref upload_dir,
            stdin_messages,
        } => {
            let options = ServeOptions {
                idle_timeout,
                upload_dir: upload_dir.clone(),
                stdin_messages,
            };
            commands::serve::run(&cli, &config, options).await
        }
        Command::Ping { count } => session::ping(&target, count, json).await,
        Command::Echo { ref message } => session::echo(&target, message, json).await,
        Command::Upload { ref path } => session::upload(&target, path, json).await,
        Command::Listen { count } => session::listen(&target, count, json).await,
        Command::Demo {
            ref file,
            ref upload_dir,
        } => commands::demo::run(&config, file, upload_dir.clone(), json).await,
        Command::Config { ref action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
