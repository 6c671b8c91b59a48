//! # Hubline CLI Entry Point
//!
//! ## Startup Sequence
//! 1. Initialize tracing (stderr, `RUST_LOG` aware)
//! 2. Load `ClientConfig` (file → env → `--server`)
//! 3. Build the client (engine, secure storage, auth synchronizer)
//! 4. Bootstrap the stored session and run the command

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use hubline_client::{ClientConfig, HublineClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = Cli::parse();

    let mut config = match ClientConfig::load(args.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            eprintln!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };
    if let Some(server) = args.server {
        config.server.base_url = server;
    }

    let client = match HublineClient::build(config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build client");
            eprintln!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };
    info!(base_url = %client.engine.base_url(), "Client ready");

    match commands::run(&client, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Everything
/// - `RUST_LOG=hubline_client=trace` - Client internals only
/// - Default: `info,hubline=debug`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hubline=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
