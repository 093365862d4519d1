use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ifc-regress",
    version,
    about = "Conversion regression runs over folders of IFC models"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert every model under a folder and write a timestamped report
    Run(RunArgs),
    /// Compare two reports without converting anything
    Compare(CompareArgs),
    Version,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Folder holding the models; reports are written here too
    pub root: PathBuf,

    /// Config file (default: <ROOT>/ifc-regress.yaml when present)
    #[arg(long, env = "IFC_REGRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Persist the converted model next to each source file
    #[arg(long)]
    pub caching: bool,

    /// Report name prefix; also selects the baseline report
    #[arg(long)]
    pub prefix: Option<String>,

    /// Source extension to include (repeatable, without the dot)
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Only scan the top level of ROOT
    #[arg(long)]
    pub top_only: bool,

    /// Skip geometry generation
    #[arg(long)]
    pub no_geometry: bool,

    /// External converter program instead of the bundled STEP reader
    #[arg(long, value_name = "PROGRAM")]
    pub command: Option<String>,

    /// Argument for --command; `{input}` and `{output}` are substituted (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true, requires = "command")]
    pub command_args: Vec<String>,

    /// Kill the external converter after this many seconds
    #[arg(long, requires = "command")]
    pub timeout_secs: Option<u64>,

    /// No per-file lines on stdout and no echo of captured events
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CompareArgs {
    /// Earlier report
    pub baseline: PathBuf,

    /// Later report
    pub current: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
