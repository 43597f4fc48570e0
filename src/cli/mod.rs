//! Command-line interface: argument parsing, tracing setup, and dispatch.

mod args;
mod commands;

pub use args::{Cli, Command};

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use camino::Utf8PathBuf;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::session::Session;

/// Parse arguments, build a session, and dispatch to the subcommand.
///
/// # Errors
///
/// Fails on invalid configuration or non-UTF-8 paths; everything past
/// session construction is fail-soft and reports through the exit code.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().map(utf8_path).transpose()?;
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(data_dir) = cli.data_dir.as_deref().map(utf8_path).transpose()? {
        config.storage.data_dir = Some(data_dir.into_string());
    }

    let mut session = Session::open(&config);
    if !matches!(cli.command, Command::Reset) {
        session.bootstrap().await;
    }

    let code = match cli.command {
        Command::Idea => commands::idea(&mut session).await?,
        Command::Status { watch } => commands::status(&mut session, watch).await?,
        Command::History => commands::history(&session)?,
        Command::Packs => commands::packs(&session)?,
        Command::Refresh => commands::refresh(&session).await?,
        Command::Reset => commands::reset(&mut session)?,
    };

    // Let any fire-and-forget replenishment land before the process exits;
    // output has already been rendered by this point.
    session.drain_background().await;
    Ok(code)
}

fn utf8_path(path: &Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|path| anyhow!("path is not valid UTF-8: {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("debug")
            } else {
                EnvFilter::try_new("warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // try_init: a second init (e.g. under tests) is not fatal.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}
