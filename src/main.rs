mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod providers;
mod ui;

use anyhow::{Context as _, Result};
use brewkit::{Backend, BrewBackend};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use declarative::CancelToken;
use lockkit::Mode;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Vec<PathBuf>,
    pub mode: Option<Mode>,
    pub cancel: CancelToken,
    pub backend: Arc<dyn Backend>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupted; stopping after the current step");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        mode: cli.mode,
        cancel,
        backend: Arc::new(BrewBackend::detect()),
    };

    match cli.command {
        Command::Plan => commands::plan::run(&ctx),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Explain { step } => commands::explain::run(&ctx, &step),
        Command::Policy => commands::policy::run(&ctx),
        Command::Lock(cmd) => commands::lock::run(&ctx, &cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "keel", &mut io::stdout());
            Ok(())
        }
    }
}
