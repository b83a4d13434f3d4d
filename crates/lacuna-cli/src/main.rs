mod cli;
mod commands;
mod tracing_config;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_config::init(cli.log_format);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let mut out = std::io::stdout();
    match cli.command {
        Commands::Resolve(args) => commands::run_resolve(&args, &mut out),
        Commands::Tree(args) => commands::run_tree(&args, &mut out),
        Commands::Uncovered(args) => commands::run_uncovered(&args, &mut out),
        Commands::Plan(args) => commands::run_plan(&args, &mut out),
    }
}
