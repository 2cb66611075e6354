//! ngcs-gen - marshal code generator
//!
//! Reads a template of `#marshal` blocks and writes `<stem>_types.rs` and
//! `<stem>_marshal.rs` into the output directory.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::path::PathBuf;

use ngcs::codegen::{self, Options};

/// ngcs-gen - generate marshal code from a template
#[derive(Parser, Debug)]
#[command(name = "ngcs-gen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Template file
    template: PathBuf,

    /// Directory for the generated files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Path generated code uses to reach the ngcs crate
    #[arg(long, default_value = "::ngcs")]
    crate_path: String,

    /// Module the implementation unit imports record types from,
    /// e.g. `super::service_types`; omit when both units share a module
    #[arg(long)]
    types_path: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let options = Options {
        crate_path: args.crate_path.clone(),
        types_path: args.types_path.clone(),
        source_name: args
            .template
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.template.display().to_string()),
    };
    info!("Generating from {} with {:?}", args.template.display(), options);

    let (types, marshal) = codegen::generate_file(&args.template, &args.out_dir, &options)
        .context(format!("Failed to generate from {}", args.template.display()))?;

    println!("{} {}", "Wrote".green(), types.display());
    println!("{} {}", "Wrote".green(), marshal.display());
    Ok(())
}
