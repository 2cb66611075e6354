//! Command state machines and the batch runner.
//!
//! Every command in a batch runs as its own future on one connection and
//! ends in a [`Verdict`]. A failure is confined to its command; only a
//! transport failure fails everything still outstanding.

pub mod errwatch;
pub mod service;
pub mod simple;
pub mod status;

use std::fmt;
use std::sync::{Arc, Mutex};

use colored::*;
use futures::future::join_all;
use log::{info, warn};
use tokio::sync::watch;

use crate::error::NgcsError;
use crate::ipc::blocking::BlockingClient;
use crate::ipc::client::{ChannelStream, Client};
use crate::ipc::demux::ChannelEvent;
use crate::ipc::messages;
use crate::ipc::value::Value;

pub use service::{Progress, Transition, TransitionTracker};
pub use status::StatusTable;

/// Default strftime format for status rows.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failed(String),
}

impl Verdict {
    pub fn failed(reason: impl Into<String>) -> Self {
        Verdict::Failed(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

impl From<NgcsError> for Verdict {
    fn from(err: NgcsError) -> Self {
        Verdict::Failed(err.to_string())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => f.write_str("SUCCESS"),
            Verdict::Failed(reason) => write!(f, "FAILED ({})", reason),
        }
    }
}

/// True when every verdict is a success.
pub fn all_succeeded(verdicts: &[Verdict]) -> bool {
    verdicts.iter().all(Verdict::is_success)
}

/// One command of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// `(name, args...)` answered on channel 0.
    Simple { name: String, args: Vec<String> },
    Start(String),
    Stop(String),
    /// Status of one service, or of all of them.
    Status(Option<String>),
    ErrWatch,
}

impl CommandSpec {
    pub fn simple(name: impl Into<String>, args: Vec<String>) -> Self {
        CommandSpec::Simple {
            name: name.into(),
            args,
        }
    }

    /// Name used in verdict lines.
    pub fn label(&self) -> String {
        match self {
            CommandSpec::Simple { name, .. } => name.clone(),
            CommandSpec::Start(service) => format!("start {}", service),
            CommandSpec::Stop(service) => format!("stop {}", service),
            CommandSpec::Status(None) => "status".to_string(),
            CommandSpec::Status(Some(service)) => format!("status {}", service),
            CommandSpec::ErrWatch => "errwatch".to_string(),
        }
    }

    /// Simple commands never open a channel.
    pub fn is_simple(&self) -> bool {
        matches!(self, CommandSpec::Simple { .. })
    }

    /// Request tuple sent on channel 0.
    pub fn request(&self) -> Value {
        match self {
            CommandSpec::Simple { name, args } => messages::command(name, args),
            CommandSpec::Start(service) => messages::start(service),
            CommandSpec::Stop(service) => messages::stop(service),
            CommandSpec::Status(service) => messages::watch_status(service.as_deref()),
            CommandSpec::ErrWatch => messages::error_watch(),
        }
    }
}

/// Where command output goes.
#[derive(Debug, Clone, Default)]
pub struct Console {
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::default()
    }

    /// Collect lines in memory instead of printing them.
    pub fn capture() -> Self {
        Self {
            captured: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn line(&self, text: impl Into<String>) {
        let text = text.into();
        match &self.captured {
            Some(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.push(text);
                }
            }
            None => println!("{}", text),
        }
    }

    /// `<label>: SUCCESS` or `<label>: FAILED (<reason>)`.
    pub fn verdict(&self, label: &str, verdict: &Verdict) {
        if self.captured.is_some() {
            self.line(format!("{}: {}", label, verdict));
            return;
        }
        match verdict {
            Verdict::Success => println!("{}: {}", label, "SUCCESS".green()),
            Verdict::Failed(reason) => println!("{}: {} ({})", label, "FAILED".red(), reason),
        }
    }

    /// Captured lines so far; empty for stdout.
    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .and_then(|lines| lines.lock().ok().map(|lines| lines.clone()))
            .unwrap_or_default()
    }
}

/// Options shared by every command of a batch.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timestamp_format: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

/// Runs batches of commands and reports their verdicts.
#[derive(Debug, Clone)]
pub struct Runner {
    console: Console,
    options: RunOptions,
    stop: watch::Receiver<bool>,
}

impl Runner {
    /// `stop` flips to `true` when the user asks watches to end.
    pub fn new(console: Console, options: RunOptions, stop: watch::Receiver<bool>) -> Self {
        Self { console, options, stop }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Run one command to its verdict without reporting it.
    pub async fn run(&self, client: &Client, spec: &CommandSpec) -> Verdict {
        match spec {
            CommandSpec::Simple { .. } => simple::run(client, spec.request(), &self.console).await,
            CommandSpec::Start(name) => service::run(client, Transition::Start, name, &self.console).await,
            CommandSpec::Stop(name) => service::run(client, Transition::Stop, name, &self.console).await,
            CommandSpec::Status(name) => {
                status::run(client, name.as_deref(), &self.options.timestamp_format, &self.console).await
            }
            CommandSpec::ErrWatch => errwatch::run(client, &self.console, self.stop.clone()).await,
        }
    }

    /// Run every command concurrently on one session, reporting each verdict
    /// as it lands. Verdicts come back in batch order.
    pub async fn run_batch(&self, client: &Client, specs: &[CommandSpec]) -> Vec<Verdict> {
        info!("Running batch of {} command(s)", specs.len());
        join_all(specs.iter().map(|spec| async move {
            let verdict = self.run(client, spec).await;
            self.report(spec, &verdict);
            verdict
        }))
        .await
    }

    /// Run simple commands one after another over the blocking transport.
    ///
    /// After a transport failure the connection is not reused: every command
    /// still to run fails with the error that broke it.
    pub fn run_blocking(&self, client: &mut BlockingClient, specs: &[CommandSpec]) -> Vec<Verdict> {
        info!("Running {} simple command(s) over the blocking transport", specs.len());
        let mut lost: Option<String> = None;
        specs
            .iter()
            .map(|spec| {
                let verdict = if let Some(reason) = &lost {
                    Verdict::failed(format!("not sent, connection lost: {}", reason))
                } else if spec.is_simple() {
                    match client.call(&spec.request()) {
                        Ok(value) => simple::finish(value, &self.console),
                        Err(e) => {
                            if client.is_broken() {
                                lost = Some(e.to_string());
                            }
                            Verdict::from(e)
                        }
                    }
                } else {
                    Verdict::failed("command needs a streaming session")
                };
                self.report(spec, &verdict);
                verdict
            })
            .collect()
    }

    fn report(&self, spec: &CommandSpec, verdict: &Verdict) {
        let label = spec.label();
        if let Verdict::Failed(reason) = verdict {
            warn!("{} failed: {}", label, reason);
        }
        self.console.verdict(&label, verdict);
    }
}

/// Next value on a data channel. Error values, closes and a lost session
/// all end the command.
pub async fn next_value(stream: &mut ChannelStream) -> Result<Value, NgcsError> {
    match stream.next().await {
        Some(ChannelEvent::Data(Ok(Value::Error(message)))) => {
            Err(NgcsError::Server(String::from_utf8_lossy(&message).into_owned()))
        }
        Some(ChannelEvent::Data(result)) => result,
        Some(ChannelEvent::Closed(code)) => Err(NgcsError::ChannelClosed {
            channel: stream.channel(),
            code,
        }),
        None => Err(NgcsError::Disconnected),
    }
}
