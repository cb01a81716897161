use clap::{Args, Parser, Subcommand, ValueEnum};
use rdb2rdf_engine::GraphFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rdb2rdf", about = "Relational-to-graph mapping engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to a TOML config file (defaults to ./rdb2rdf.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the mapping document and synchronize the output
    Run(RunArgs),

    /// Show the run log of the last run
    Status(StatusArgs),

    /// Validate a mapping document and print the execution order
    Check {
        /// Mapping document (JSON or TOML)
        #[arg(long, short = 'm')]
        mapping: Option<PathBuf>,

        /// Base namespace for relative IRI templates
        #[arg(long)]
        namespace: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// SQLite database to read from
    #[arg(long, short = 'd')]
    pub database: Option<PathBuf>,

    /// Mapping document (JSON or TOML)
    #[arg(long, short = 'm')]
    pub mapping: Option<PathBuf>,

    /// Graph file to write
    #[arg(long, short = 'o', conflicts_with = "store")]
    pub output: Option<PathBuf>,

    /// Syntax of the graph file (defaults to the output extension)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// SQLite statement store to synchronize instead of a file
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Regenerate only mappings whose query, definition or data changed
    #[arg(long)]
    pub incremental: bool,

    /// Percent-encode template values substituted into IRIs
    #[arg(long)]
    pub encode_urls: bool,

    /// Base namespace for relative IRI templates
    #[arg(long)]
    pub namespace: Option<String>,

    /// Run log path (defaults to <output>.runlog.json)
    #[arg(long)]
    pub run_log: Option<PathBuf>,

    /// Write the provenance side-table on full runs too
    #[arg(long)]
    pub provenance: bool,

    /// Keep going when a mapping fails, preserving its previous statements
    #[arg(long)]
    pub continue_on_error: bool,

    /// Graph file (N-Triples or Turtle) merged into the output
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Empty the store before writing this run's statements
    #[arg(long)]
    pub clean_store: bool,
}

#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Graph file or store whose run log to read
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Run log path, overriding the one derived from the output
    #[arg(long)]
    pub run_log: Option<PathBuf>,

    /// Print the raw run log as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    Ntriples,
    Turtle,
}

impl From<FormatArg> for GraphFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Ntriples => GraphFormat::NTriples,
            FormatArg::Turtle => GraphFormat::Turtle,
        }
    }
}
