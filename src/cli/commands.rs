use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tv",
    about = concat!("taskvault v", env!("CARGO_PKG_VERSION"), " - tasks in your markdown notes"),
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different vault directory
    #[arg(short = 'C', long = "vault", global = true)]
    pub vault_dir: Option<String>,

    /// Log filter (e.g. `debug`, `taskvault::cache=trace`); overrides TASKVAULT_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every task in the vault, grouped by file
    List(ListArgs),
    /// Keep the index up to date and report every change
    Watch,
    /// Toggle a task between todo and done
    Toggle(ToggleArgs),
    /// Move a task (with its children) to another file or heading
    Move(MoveArgs),
    /// Set a value in .taskvault.toml
    Config(ConfigArgs),
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ListArgs {
    /// Only files whose path contains this text
    #[arg(long)]
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ToggleArgs {
    /// Task to toggle, as <path>:<line> (line numbers start at 1)
    pub task: String,
}

#[derive(Args)]
pub struct MoveArgs {
    /// Task to move, as <path>:<line> (line numbers start at 1)
    pub task: String,
    /// Markdown file to move the task into
    pub target: String,
    /// File the task under this heading
    #[arg(long, conflicts_with = "end")]
    pub heading: Option<String>,
    /// Append to the end of the target file
    #[arg(long)]
    pub end: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Dotted key, e.g. `edit.max_retries` or `global_filter`
    pub key: String,
    /// New value
    pub value: String,
}
