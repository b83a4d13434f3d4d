use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: text, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "Coverage overlay and test-scope resolver for Python projects"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Resolve the innermost class or function at a row
    Resolve(ResolveArgs),
    /// Print the declaration tree of a file
    Tree(TreeArgs),
    /// List executable rows with no recorded coverage
    Uncovered(UncoveredArgs),
    /// Derive the test invocation for a file without running it
    Plan(PlanArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ResolveArgs {
    #[arg(help = "Python source file")]
    pub file: PathBuf,

    #[arg(long, help = "Zero-based row to resolve")]
    pub row: usize,

    #[arg(
        long,
        default_value = "text",
        value_parser = parse_output_format,
        help = "Output format: text or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct TreeArgs {
    #[arg(help = "Python source file")]
    pub file: PathBuf,

    #[arg(
        long,
        default_value = "text",
        value_parser = parse_output_format,
        help = "Output format: text or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct UncoveredArgs {
    #[arg(help = "Python source file")]
    pub file: PathBuf,

    #[arg(
        long,
        default_value = "text",
        value_parser = parse_output_format,
        help = "Output format: text or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct PlanArgs {
    #[arg(help = "Python source file")]
    pub file: PathBuf,

    #[arg(
        long,
        help = "Zero-based cursor row used to scope the run to a class or function"
    )]
    pub row: Option<usize>,

    #[arg(
        long,
        default_value = "text",
        value_parser = parse_output_format,
        help = "Output format: text or json"
    )]
    pub output: OutputFormat,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}
