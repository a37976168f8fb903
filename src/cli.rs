//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "blueprint",
    about = "Declarative machine provisioning with drift-aware status",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Provision as this OS instead of the detected one (mac, linux)
    #[arg(long, global = true)]
    pub os: Option<String>,

    /// Override the status file location
    #[arg(long, global = true)]
    pub status_file: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile the system with a blueprint
    Apply(BlueprintOpts),
    /// Show what `apply` would do without running anything
    Plan(BlueprintOpts),
    /// List recorded resources
    Status(StatusOpts),
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
    /// Print version information
    Version,
}

impl Command {
    /// Subcommand name, used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Apply(_) => "apply",
            Self::Plan(_) => "plan",
            Self::Status(_) => "status",
            Self::Completions { .. } => "completions",
            Self::Version => "version",
        }
    }
}

/// Options for subcommands that read a blueprint.
#[derive(Parser, Debug, Clone)]
pub struct BlueprintOpts {
    /// Blueprint file
    pub file: PathBuf,
}

/// Options for the `status` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct StatusOpts {
    /// Only show resources declared by this blueprint on this OS
    pub file: Option<PathBuf>,
}
