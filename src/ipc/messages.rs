//! Control-socket message shapes.
//!
//! Requests are tuples of tagged values sent on channel 0. Streamed responses
//! arrive on a freshly assigned channel as tuples whose shape depends on the
//! command; this module turns those tuples into typed values.

use std::fmt;

use crate::error::{NgcsError, Result};
use crate::ipc::value::Value;

/// Request names understood by the daemon.
pub struct Methods;

impl Methods {
    /// Start a service, streaming its progress.
    pub const START: &'static str = "start";
    /// Stop a service, streaming its progress.
    pub const STOP: &'static str = "stop";
    /// Watch service state.
    pub const WATCH: &'static str = "watch";
    /// Watch the daemon's error log.
    pub const ERROR_WATCH: &'static str = "ewatch";
}

/// Flags for the `watch` request.
pub struct WatchFlags;

impl WatchFlags {
    /// Send the current status of each service, then the real-time marker.
    pub const CURRENT_STATUS: i32 = 1;
}

/// Build a `(name, args...)` request.
pub fn command(name: &str, args: &[String]) -> Value {
    Value::tuple(
        std::iter::once(Value::from(name)).chain(args.iter().map(|arg| Value::from(arg.as_str()))),
    )
}

pub fn start(service: &str) -> Value {
    Value::tuple([Value::from(Methods::START), Value::from(service)])
}

pub fn stop(service: &str) -> Value {
    Value::tuple([Value::from(Methods::STOP), Value::from(service)])
}

pub fn error_watch() -> Value {
    Value::tuple([Value::from(Methods::ERROR_WATCH)])
}

/// `(watch, CURRENT_STATUS, service | none)`
pub fn watch_status(service: Option<&str>) -> Value {
    Value::tuple([
        Value::from(Methods::WATCH),
        Value::Int32(WatchFlags::CURRENT_STATUS),
        Value::from(service),
    ])
}

/// Service state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StateCode {
    Unknown = 0,
    Up = 1,
    Down = 2,
    Failed = 3,
    Starting = 4,
    Stopping = 5,
    Waiting = 6,
}

impl StateCode {
    /// Transitional states never end a start or stop.
    pub fn is_transitional(self) -> bool {
        matches!(self, StateCode::Starting | StateCode::Stopping)
    }
}

impl TryFrom<i32> for StateCode {
    type Error = NgcsError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(StateCode::Unknown),
            1 => Ok(StateCode::Up),
            2 => Ok(StateCode::Down),
            3 => Ok(StateCode::Failed),
            4 => Ok(StateCode::Starting),
            5 => Ok(StateCode::Stopping),
            6 => Ok(StateCode::Waiting),
            other => Err(NgcsError::protocol(format!("unknown state code {}", other))),
        }
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateCode::Unknown => "unknown",
            StateCode::Up => "up",
            StateCode::Down => "down",
            StateCode::Failed => "failed",
            StateCode::Starting => "starting",
            StateCode::Stopping => "stopping",
            StateCode::Waiting => "waiting",
        };
        f.write_str(name)
    }
}

/// `(description, code)` as sent by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceState {
    pub description: String,
    pub code: StateCode,
}

impl TryFrom<&Value> for ServiceState {
    type Error = NgcsError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Struct(items) => match items.as_slice() {
                [description, Value::Int32(code)] => Ok(Self {
                    description: text(description, "state description")?,
                    code: StateCode::try_from(*code)?,
                }),
                _ => Err(shape("(description, code)", value)),
            },
            _ => Err(shape("(description, code)", value)),
        }
    }
}

/// One item of a start/stop stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceUpdate {
    /// Buffered history is over; later states are live.
    RealTime,
    /// Text the service or daemon produced.
    Output { service: String, text: String },
    /// State transition.
    State { service: String, state: ServiceState },
}

impl TryFrom<Value> for ServiceUpdate {
    type Error = NgcsError;

    fn try_from(value: Value) -> Result<Self> {
        let items = match &value {
            Value::None => return Ok(ServiceUpdate::RealTime),
            Value::Struct(items) => items,
            _ => return Err(shape("service update", &value)),
        };
        match items.as_slice() {
            [service, Value::String(bytes)] => Ok(ServiceUpdate::Output {
                service: text(service, "service name")?,
                text: String::from_utf8_lossy(bytes).into_owned(),
            }),
            [service, state @ Value::Struct(_)] => Ok(ServiceUpdate::State {
                service: text(service, "service name")?,
                state: ServiceState::try_from(state)?,
            }),
            _ => Err(shape("(service, output | state)", &value)),
        }
    }
}

/// One row of a status stream: `(service, output, (description, code), ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub service: String,
    pub output: Option<String>,
    pub state: ServiceState,
}

impl TryFrom<&Value> for StatusEntry {
    type Error = NgcsError;

    fn try_from(value: &Value) -> Result<Self> {
        let items = value
            .as_struct()
            .ok_or_else(|| shape("status entry", value))?;
        match items {
            [service, output, state, ..] => Ok(Self {
                service: text(service, "service name")?,
                output: match output {
                    Value::None => None,
                    other => Some(text(other, "service output")?),
                },
                state: ServiceState::try_from(state)?,
            }),
            _ => Err(shape("(service, output, state, ...)", value)),
        }
    }
}

/// One error-log record: `(severity, file, func, line, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub severity: i32,
    pub file: String,
    pub func: String,
    pub line: i32,
    pub message: String,
}

impl TryFrom<&Value> for ErrorReport {
    type Error = NgcsError;

    fn try_from(value: &Value) -> Result<Self> {
        match value.as_struct() {
            Some([Value::Int32(severity), file, func, Value::Int32(line), message]) => Ok(Self {
                severity: *severity,
                file: text(file, "file")?,
                func: text(func, "function")?,
                line: *line,
                message: text(message, "message")?,
            }),
            _ => Err(shape("(severity, file, func, line, message)", value)),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{} {}(): {}",
            self.severity,
            self.file,
            self.line,
            self.func,
            self.message.trim_end()
        )
    }
}

fn text(value: &Value, what: &str) -> Result<String> {
    value
        .as_text()
        .map(|text| text.into_owned())
        .ok_or_else(|| NgcsError::protocol(format!("{} must be a string, got {}", what, value.type_code())))
}

fn shape(expected: &str, got: &Value) -> NgcsError {
    NgcsError::protocol(format!("expected {}, got {}", expected, got))
}
