use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use super::output::OutputFormat;

/// Drive the controlsync engine against saved pages or a live endpoint.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// YAML configuration (defaults to ./config/controlsync.yaml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    pub debug: bool,

    /// Report format written to stdout
    #[arg(short, long, global = true, value_enum, default_value = "human")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
