use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spg_domain::config::GatewayConfig;
use spg_gateway::cli::{doctor, Cli, Command};
use spg_gateway::core::Core;
use spg_gateway::registry::ToolRegistry;
use spg_gateway::server;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match GatewayConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let core = match Core::new(config) {
                Ok(core) => Arc::new(core),
                Err(e) => {
                    tracing::error!(error = %e, "failed to build gateway core");
                    return ExitCode::FAILURE;
                }
            };
            let registry = Arc::new(ToolRegistry::new());
            match server::run(core, registry).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "server loop failed");
                    ExitCode::FAILURE
                }
            }
        }
        Some(Command::Doctor) => {
            if doctor(&config) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Some(Command::Version) => {
            println!("spgateway {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
