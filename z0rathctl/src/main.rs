//! z0rathctl: check and watch z0rath permissions from a terminal.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use z0rath_core::{ClientConfig, ConfigLoader};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "z0rathctl", version)]
#[command(about = "Check and watch permissions granted by the z0rath authorization service")]
struct Cli {
    /// Path to a z0rath.toml configuration file
    #[arg(long, global = true, env = "Z0RATH_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// User to act as (overrides config)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// REST base URL including the version prefix (overrides config)
    #[arg(long, global = true)]
    base_url: Option<Url>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask once whether the user holds a slug.
    ///
    /// Exits 0 when granted, 1 when denied and 2 when the service could not
    /// answer in time.
    Check {
        slug: String,

        /// How long to wait for an answer
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },

    /// Guard one or more slugs and log grants and revocations until Ctrl-C
    Watch {
        #[arg(required = true)]
        slugs: Vec<String>,
    },

    /// Log every invalidation pushed to the user until Ctrl-C
    Listen,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "info,z0rath_core=debug,z0rathctl=debug",
        _ => "debug,z0rath_core=trace,z0rathctl=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    if let Some(user) = &cli.user {
        loader = loader.with_user(user);
    }
    if let Some(base_url) = &cli.base_url {
        loader = loader.with_base_url(base_url.clone());
    }
    loader.load().context("failed to load z0rath configuration")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    tracing::debug!(base_url = %config.base_url, user = ?config.user, "configuration loaded");

    match cli.command {
        Command::Check { slug, timeout } => commands::check(config, &slug, timeout).await,
        Command::Watch { slugs } => commands::watch(config, slugs).await,
        Command::Listen => commands::listen(config).await,
    }
}
