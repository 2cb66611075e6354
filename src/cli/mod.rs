//! CLI module for ngcs - argument parsing and the batch grammar.
//!
//! The command line is a handful of options followed by a batch of command
//! groups; `batch` turns the raw batch words into command specs.

pub mod batch;
pub mod commands;

pub use batch::parse_batch;
pub use commands::Cli;
