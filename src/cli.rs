use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(version)]
#[command(about = "Converge file ownership, environment variables and downloads to a manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
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
    /// Make the system match the manifest
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff(DiffArgs),

    /// Check that every resource in the manifest can be applied
    Validate(ValidateArgs),

    /// Inspect the download cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Manifest to load (default: <config dir>/steward.toml)
    #[arg(short, long, env = "STEWARD_MANIFEST")]
    pub manifest: Option<PathBuf>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs for probing
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Only resources matching: type or type.name (e.g. env.PATH)
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Number of parallel jobs for probing
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Number of parallel jobs for probing
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Only resources matching: type or type.name (e.g. env.PATH)
    pub target: Option<String>,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Print the cache keys derived from a URI
    Key {
        /// Source URI
        uri: String,
    },

    /// Print the cached validators for a URI
    Show {
        /// Source URI
        uri: String,

        /// Checksum of the file on disk; entries for other content are discarded
        #[arg(long)]
        checksum: Option<String>,
    },
}
