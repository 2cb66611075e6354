//! CLI definitions using clap.

use clap::Parser;
use std::path::PathBuf;

/// ngcs - control client for the service supervision daemon
#[derive(Parser, Debug)]
#[command(name = "ngcs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Control socket path (overrides config and NGCS_SOCKET)
    #[arg(short, long)]
    pub socket: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Commands: --start S..., --stop S..., --status [S...], --errwatch,
    /// --NAME [ARGS...], or a leading NAME [ARGS...]
    #[arg(
        value_name = "BATCH",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub batch: Vec<String>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
