mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use amoe_core::config::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    // One mailbox session and one browser at a time; no worker pool needed
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config = AppConfig::from_toml_str(&config_str)
        .with_context(|| format!("failed to parse {}", cli.config))?;

    // MAIL_ADDRESS, MAIL_PASSWORD, APPLICANT_* ... win over the file
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Run { report } => {
            commands::run::run(config, report).await?;
        }
        Commands::Harvest => {
            commands::harvest::run(config).await?;
        }
        Commands::Check => {
            commands::check::run(&config);
        }
    }

    Ok(())
}
