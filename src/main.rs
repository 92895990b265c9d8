use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use remedy::cli::Cli;
use remedy::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = project_root(&cli)?;
    commands::run(cli.command, &root, cli.json)
}

fn project_root(cli: &Cli) -> Result<PathBuf> {
    match &cli.project {
        Some(path) => Ok(path.clone()),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}
