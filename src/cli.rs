use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative provisioning of an Azure VM playground", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack config file (default: nimbus.toml in the config directory)
    #[arg(short, long, global = true, env = "NIMBUS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update every declared resource
    Apply(ApplyArgs),

    /// Delete recorded resources
    Destroy(DestroyArgs),

    /// Show the dependency graph of the declared stack
    Graph(GraphArgs),

    /// Inspect reconciliation state
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Provider calls in flight at once (overrides engine.concurrency_limit)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Keep recorded resources that are no longer declared
    #[arg(long)]
    pub no_prune: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Resources to delete, as `name` or `kind::name` (default: everything).
    /// Resources that depend on a target are deleted too.
    pub targets: Vec<String>,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Provider calls in flight at once (overrides engine.concurrency_limit)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct GraphArgs {
    /// Emit Graphviz DOT instead of a list
    #[arg(long)]
    pub dot: bool,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resources
    List,

    /// Show the realized properties of one resource
    Show {
        /// Resource as `name` or `kind::name`
        target: String,
    },
}
