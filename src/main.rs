mod cli;
mod commands;
mod host;
mod paths;
mod runner;
mod schema;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{BackupsCommand, Cli, Command, LedgerCommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Explicit config file
    pub config: Option<PathBuf>,
    /// Packages root override
    pub source: Option<String>,
    /// Target root override
    pub target: Option<String>,
}

/// How a command finished when it did not error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Everything requested succeeded
    Clean,
    /// At least one package failed; the rest were processed
    PackagesFailed,
}

/// Exit code for a run-fatal or configuration error
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
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
        config: cli.config,
        source: cli.source,
        target: cli.target,
    };

    match dispatch(&ctx, cli.command) {
        Ok(Finish::Clean) => ExitCode::SUCCESS,
        Ok(Finish::PackagesFailed) => ExitCode::FAILURE,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if let Some(engine) = e.downcast_ref::<stowkit::Error>() {
                ui::dim(engine.category().advice());
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn dispatch(ctx: &Context, command: Command) -> anyhow::Result<Finish> {
    match command {
        Command::Apply(args) => commands::apply::run(ctx, &args),
        Command::Plan(args) => commands::plan::run(ctx, &args),
        Command::Status => commands::status::run(ctx),
        Command::Ledger(cmd) => match cmd {
            LedgerCommand::List { json } => commands::ledger::list(ctx, json),
            LedgerCommand::Reset { package } => commands::ledger::reset(ctx, &package),
            LedgerCommand::ResetAll => commands::ledger::reset_all(ctx),
        },
        Command::Backups(cmd) => match cmd {
            BackupsCommand::List => commands::backups::list(ctx),
        },
        Command::Init(args) => commands::init::run(ctx, &args),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "dotlink", &mut io::stdout());
            Ok(Finish::Clean)
        }
    }
}
