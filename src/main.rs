mod aggregator;
mod auth;
mod cli;
mod config;
mod dashboard;
mod domain;
mod error;
mod providers;

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use env_logger::{Env, Target};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_file)?;

    info!("Starting ciwatch {}", env!("CARGO_PKG_VERSION"));
    cli.execute().await?;

    Ok(())
}

fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .init();

    Ok(())
}
