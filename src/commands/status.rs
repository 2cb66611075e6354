//! Status: collect current service states until the real-time marker.

use std::fmt::Write;

use chrono::Local;
use log::{debug, warn};

use crate::commands::{Console, DEFAULT_TIMESTAMP_FORMAT, Verdict, next_value};
use crate::ipc::client::Client;
use crate::ipc::messages::{self, StatusEntry};
use crate::ipc::value::Value;

/// Rows keyed by service, kept in arrival order.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    rows: Vec<StatusEntry>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row, replacing an earlier one for the same service in place.
    pub fn insert(&mut self, entry: StatusEntry) {
        match self.rows.iter_mut().find(|row| row.service == entry.service) {
            Some(row) => *row = entry,
            None => self.rows.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[StatusEntry] {
        &self.rows
    }

    /// `timestamp  service  description`, service column padded.
    pub fn render(&self, timestamp: &str) -> Vec<String> {
        let width = self.rows.iter().map(|row| row.service.len()).max().unwrap_or(0);
        self.rows
            .iter()
            .map(|row| {
                format!(
                    "{}  {:<width$}  {}",
                    timestamp,
                    row.service,
                    row.state.description,
                    width = width
                )
            })
            .collect()
    }
}

pub async fn run(client: &Client, service: Option<&str>, timestamp_format: &str, console: &Console) -> Verdict {
    let mut stream = match client.open_stream(messages::watch_status(service)).await {
        Ok(stream) => stream,
        Err(e) => return Verdict::from(e),
    };

    let mut table = StatusTable::new();
    loop {
        let value = match next_value(&mut stream).await {
            Ok(value) => value,
            Err(e) => return Verdict::from(e),
        };
        if let Value::None = value {
            break;
        }
        match StatusEntry::try_from(&value) {
            Ok(entry) => {
                debug!("status {}: {}", entry.service, entry.state.description);
                table.insert(entry);
            }
            Err(e) => return Verdict::from(e),
        }
    }
    stream.close();

    let timestamp = timestamp(timestamp_format);
    for line in table.render(&timestamp) {
        console.line(line);
    }
    Verdict::Success
}

/// Current local time; an unusable format falls back to the default.
pub fn timestamp(format: &str) -> String {
    let now = Local::now();
    let mut text = String::new();
    if write!(text, "{}", now.format(format)).is_err() {
        warn!("Invalid timestamp format {:?}, using default", format);
        return now.format(DEFAULT_TIMESTAMP_FORMAT).to_string();
    }
    text
}
