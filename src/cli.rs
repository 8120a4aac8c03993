use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dotlink")]
#[command(author = "dotlink contributors")]
#[command(version)]
#[command(about = "Declarative dotfiles symlink reconciliation on top of GNU stow", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: <config dir>/config.toml)
    #[arg(long, global = true, env = "DOTLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Packages root (overrides [packages].source)
    #[arg(long, global = true)]
    pub source: Option<String>,

    /// Target root (overrides [packages].target)
    #[arg(long, global = true)]
    pub target: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile packages: back up blockers, link, record completion
    Apply(ApplyArgs),

    /// Show planned links and their state without changing anything
    Plan(PlanArgs),

    /// Show a per-package status table
    Status,

    /// Inspect or reset the completion ledger
    #[command(subcommand)]
    Ledger(LedgerCommand),

    /// Inspect backups made by previous runs
    #[command(subcommand)]
    Backups(BackupsCommand),

    /// Write a starter config, discovering packages in the source root
    Init(InitArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Plan
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    /// Packages to reconcile (default: all configured)
    pub packages: Vec<String>,

    /// Run even when the ledger marks a package complete
    #[arg(short, long)]
    pub force: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Packages to preview (default: all configured)
    pub packages: Vec<String>,

    /// Print previews as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Ledger Commands
// ============================================================================

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// List completion markers
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget every marker of one package
    Reset {
        /// Package name
        package: String,
    },

    /// Forget every marker
    ResetAll,
}

// ============================================================================
// Backup Commands
// ============================================================================

#[derive(Subcommand)]
pub enum BackupsCommand {
    /// List backup runs and the paths they hold
    List,
}

// ============================================================================
// Init
// ============================================================================

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config
    #[arg(short, long)]
    pub force: bool,
}
