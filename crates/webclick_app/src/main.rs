mod cli;
mod commands;
mod config;
mod effects;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use webclick_engine::Engine;
use webclick_logging::{webclick_debug, webclick_error};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if !webclick_logging::initialize(&cli.log_settings()) {
        eprintln!("Warning: logging could not be initialized");
    }

    let mut config = config::load(cli.config.as_deref(), cli.output.clone())?;
    if let Command::Archive {
        format: Some(format),
        ..
    } = &cli.command
    {
        config.render.format = (*format).into();
    }
    webclick_debug!("output directory {}", config.output_dir.display());

    let engine = Engine::new(config).context("setting up the http client")?;
    let result = match cli.command {
        Command::Links { url } => commands::links(&engine, &url).await,
        Command::Archive { urls, root, .. } => commands::archive(&engine, root, &urls).await,
        Command::Explore { url } => commands::explore(engine.clone(), &url).await,
    };
    engine.shutdown().await;

    if let Err(err) = &result {
        webclick_error!("{err:#}");
    }
    result
}
