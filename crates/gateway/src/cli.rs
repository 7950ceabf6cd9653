//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use spg_catalog::CatalogStore;
use spg_domain::config::GatewayConfig;
use spg_domain::marketplace::Marketplace;

#[derive(Parser)]
#[command(name = "spgateway", version, about = "Marketplace API gateway over stdio")]
pub struct Cli {
    /// Optional TOML config file layered under the environment.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the stdio server (the default).
    Serve,
    /// Check configuration and the catalog, then exit.
    Doctor,
    /// Print the version.
    Version,
}

/// Configuration health check. Prints findings to stderr, returns whether
/// the gateway can start at all (missing credentials only disable the
/// corresponding operations).
pub fn doctor(config: &GatewayConfig) -> bool {
    let mut healthy = true;

    if Marketplace::by_country(&config.default_marketplace).is_none() {
        eprintln!(
            "FAIL default marketplace '{}' is not in the marketplace table",
            config.default_marketplace
        );
        healthy = false;
    } else {
        eprintln!("ok   default marketplace: {}", config.default_marketplace);
    }

    if config.credentials.has_login_credentials() {
        eprintln!("ok   identity-provider credentials configured");
    } else {
        eprintln!("warn identity-provider credentials missing; upstream calls will fail AuthFailed");
    }
    if config.credentials.has_signing_credentials() {
        let mode = if config.credentials.role_arn.is_some() {
            "delegated role"
        } else {
            "static pair"
        };
        eprintln!("ok   signing credentials configured ({mode})");
    } else {
        eprintln!("warn signing credentials missing; signed dispatch disabled");
    }

    match CatalogStore::open(&config.catalog.path) {
        Ok(store) => {
            let count = store.search(&Default::default()).len();
            eprintln!(
                "ok   catalog at {} ({count} active filters)",
                config.catalog.path.display()
            );
        }
        Err(e) => {
            eprintln!("FAIL catalog at {}: {e}", config.catalog.path.display());
            healthy = false;
        }
    }

    healthy
}
