use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use lockkit::Mode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative machine configuration: compile, plan, apply", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file; repeat to layer several (later files win)
    #[arg(short, long = "config", global = true)]
    pub config: Vec<PathBuf>,

    /// Reproducibility mode: intent, locked or frozen
    #[arg(long, global = true)]
    pub mode: Option<Mode>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan,

    /// Make the machine match the configuration
    Apply(ApplyArgs),

    /// Explain what a step does
    Explain {
        /// Step ID, e.g. brew:formula:git
        step: String,
    },

    /// Evaluate policy and org policy against the configuration
    Policy,

    /// Inspect or refresh the lockfile
    #[command(subcommand)]
    Lock(LockCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Report what would be applied without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Undo applied steps if any step fails
    #[arg(long)]
    pub rollback: bool,

    /// Parallel jobs per dependency wave
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Apply even when policy or blocking org policy is violated
    #[arg(long)]
    pub ignore_policy: bool,
}

#[derive(Subcommand)]
pub enum LockCommand {
    /// Show mode, machine, entries and drift
    Status,

    /// Plan and record current versions without applying
    Update,
}
