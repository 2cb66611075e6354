use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use tokio::sync::watch;

use ngcs::commands::{CommandSpec, Console, RunOptions, Runner, all_succeeded};
use ngcs::ipc::client::{Client, ClientConfig, describe_socket};
use ngcs::ipc::BlockingClient;

mod cli;
mod config;

use cli::{Cli, parse_batch};
use config::Config;

/// Exit status when a second Ctrl-C aborts the batch.
const INTERRUPTED: i32 = 130;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ngcs")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("ngcs.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn run_application(cli: &Cli, config: &Config, specs: &[CommandSpec]) -> Result<bool> {
    info!("Starting batch: {:?}", specs);

    let client_config = config.client_config(cli.socket.as_deref());
    if cli.is_verbose() {
        println!("{} {}", "Socket:".cyan(), describe_socket(&client_config.socket_path));
    }

    if specs.iter().all(CommandSpec::is_simple) {
        return run_blocking(&client_config, config.run_options(), specs);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run_session(&client_config, config.run_options(), specs))
}

fn run_blocking(client_config: &ClientConfig, options: RunOptions, specs: &[CommandSpec]) -> Result<bool> {
    let mut client = BlockingClient::connect(client_config)
        .context(format!("Failed to connect to {}", client_config.socket_path.display()))?;

    // nothing to stop: simple commands never watch
    let (_stop, stop_rx) = watch::channel(false);
    let runner = Runner::new(Console::stdout(), options, stop_rx);
    let verdicts = runner.run_blocking(&mut client, specs);
    Ok(all_succeeded(&verdicts))
}

async fn run_session(client_config: &ClientConfig, options: RunOptions, specs: &[CommandSpec]) -> Result<bool> {
    let client = Client::connect(client_config)
        .await
        .context(format!("Failed to connect to {}", client_config.socket_path.display()))?;

    let (stop, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Interrupt received, stopping watches");
        let _ = stop.send(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, aborting");
            std::process::exit(INTERRUPTED);
        }
    });

    let runner = Runner::new(Console::stdout(), options, stop_rx);
    let verdicts = runner.run_batch(&client, specs).await;
    Ok(all_succeeded(&verdicts))
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging at the configured level
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    let specs = parse_batch(&cli.batch)?;

    // Run the main application logic
    let succeeded = run_application(&cli, &config, &specs).context("Application failed")?;

    std::process::exit(if succeeded { 0 } else { 1 });
}
