mod cli;
mod commands;
mod config;
mod engine;
mod error;
mod paths;
mod progress;
mod resource;
mod sysenv;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{CacheCommand, Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
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

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Apply(args) => commands::declarative::apply(
            &ctx,
            args.manifest.manifest.as_deref(),
            args.target.as_deref(),
            &engine::ExecuteOptions {
                dry_run: args.dry_run,
                jobs: args.jobs,
                yes: args.yes,
                verbose: ctx.verbose > 0,
            },
        ),
        Command::Diff(args) => commands::declarative::diff(
            &ctx,
            args.manifest.manifest.as_deref(),
            args.target.as_deref(),
            args.jobs,
        ),
        Command::Validate(args) => commands::declarative::validate(
            &ctx,
            args.manifest.manifest.as_deref(),
            args.jobs,
        ),
        Command::Cache(cmd) => match cmd {
            CacheCommand::Key { uri } => commands::cache::key(&uri),
            CacheCommand::Show { uri, checksum } => {
                commands::cache::show(&uri, checksum.as_deref())
            }
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "steward", &mut io::stdout());
            Ok(())
        }
    }
}
