//! Conveyor - a multi-stage asset build pipeline engine.

#![allow(dead_code)]

mod asset;
mod cache;
mod cli;
mod config;
mod error;
mod filter;
mod logger;
mod matcher;
mod order;
mod pipeline;
mod stage;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use filter::FilterRegistry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    // The standalone binary ships no compile plugins; manifests using
    // `kind = "compile"` are rejected at validation with the plugin name.
    let registry = FilterRegistry::new();

    match &cli.command {
        Commands::Build { clean } => cli::build::run_build(&cli, &registry, *clean),
        Commands::Validate => cli::build::run_validate(&cli, &registry),
    }
}
