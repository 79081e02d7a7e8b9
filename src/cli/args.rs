//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Conveyor asset pipeline CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Manifest file path (default: conveyor.toml)
    #[arg(short = 'C', long, default_value = crate::config::MANIFEST_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run every pipeline stage
    #[command(visible_alias = "b")]
    Build {
        /// Discard the cache before building
        #[arg(short, long)]
        clean: bool,
    },

    /// Check the manifest without running any stage
    #[command(visible_alias = "v")]
    Validate,
}
