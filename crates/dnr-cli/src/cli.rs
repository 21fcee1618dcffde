//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Donorflow - consolidate donor data from many source systems
#[derive(Parser, Debug)]
#[command(name = "dnr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the warehouse database path
    #[arg(long, global = true, env = "DONORFLOW_DATABASE")]
    pub database: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the warehouse schema and register source systems
    Setup,

    /// Load export files into the raw layer
    Ingest(IngestArgs),

    /// Build silver entity tables from raw records
    Transform(TransformArgs),

    /// Recompute the cross-source identity map
    Resolve,

    /// Define serving views in dependency order
    Views(ViewsArgs),

    /// Copy serving views into indexed tables
    Materialize(MaterializeArgs),

    /// Run every stage from setup to the integrity summary
    Pipeline(PipelineArgs),

    /// Run a read-only query against the serving layer
    Query(QueryArgs),

    /// Show file lineage, materialization states and recent runs
    Status(StatusArgs),
}

/// Arguments for the ingest command
#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Only this source system
    #[arg(short, long)]
    pub source: Option<String>,

    /// Only this file name
    #[arg(long)]
    pub only: Option<String>,

    /// Skip the first N files of each source
    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the transform command
#[derive(Args, Debug, Clone, Default)]
pub struct TransformArgs {
    /// Only this source system
    #[arg(short, long)]
    pub source: Option<String>,

    /// Only this entity kind (contact, donation, ...)
    #[arg(short, long)]
    pub entity: Option<String>,

    /// Skip the first N sources
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
}

/// Arguments for the views command
#[derive(Args, Debug, Clone, Default)]
pub struct ViewsArgs {
    /// Only this view and the views it selects from
    #[arg(long)]
    pub view: Option<String>,
}

/// Arguments for the materialize command
#[derive(Args, Debug, Clone, Default)]
pub struct MaterializeArgs {
    /// Only this view; its dependencies must already be tables
    #[arg(long)]
    pub view: Option<String>,

    /// Skip the first N views of the dependency order
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
}

/// Arguments for the pipeline command
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Continue the last failed run from the stage that failed
    #[arg(long)]
    pub resume: bool,

    /// Do not load new export files
    #[arg(long)]
    pub skip_ingest: bool,
}

/// Arguments for the query command
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// A single SELECT or WITH statement
    pub sql: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Only lineage of this source system
    #[arg(short, long)]
    pub source: Option<String>,

    /// Pipeline stages to show
    #[arg(long, default_value_t = 10)]
    pub runs: usize,
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned text table
    #[default]
    Table,
    /// JSON array of row objects
    Json,
}
