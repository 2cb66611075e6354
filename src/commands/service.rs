//! Start and stop: follow a service's state stream to a terminal state.
//!
//! States that arrive before the real-time marker are history and never end
//! the command. After it, the first non-transitional state of the target
//! service decides the verdict.

use log::debug;

use crate::commands::{Console, Verdict, next_value};
use crate::ipc::client::Client;
use crate::ipc::messages::{self, ServiceUpdate, StateCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
}

impl Transition {
    /// Whether `code` ends the transition, and with which outcome.
    pub fn settle(self, code: StateCode) -> Option<bool> {
        if code.is_transitional() {
            return None;
        }
        let reached = match self {
            Transition::Start => matches!(code, StateCode::Up | StateCode::Waiting),
            Transition::Stop => code == StateCode::Down,
        };
        Some(reached)
    }

    pub fn name(self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Done(Verdict),
}

/// State machine for one start or stop.
#[derive(Debug, Clone)]
pub struct TransitionTracker {
    transition: Transition,
    service: String,
    realtime: bool,
}

impl TransitionTracker {
    pub fn new(transition: Transition, service: impl Into<String>) -> Self {
        Self {
            transition,
            service: service.into(),
            realtime: false,
        }
    }

    pub fn is_realtime(&self) -> bool {
        self.realtime
    }

    pub fn observe(&mut self, update: &ServiceUpdate) -> Progress {
        match update {
            ServiceUpdate::RealTime => {
                self.realtime = true;
                Progress::Pending
            }
            ServiceUpdate::Output { .. } => Progress::Pending,
            ServiceUpdate::State { service, state } => {
                if !self.realtime || *service != self.service {
                    return Progress::Pending;
                }
                match self.transition.settle(state.code) {
                    None => Progress::Pending,
                    Some(true) => Progress::Done(Verdict::Success),
                    Some(false) => Progress::Done(Verdict::failed(format!(
                        "{} is {}",
                        self.service, state.description
                    ))),
                }
            }
        }
    }
}

pub async fn run(client: &Client, transition: Transition, service: &str, console: &Console) -> Verdict {
    let request = match transition {
        Transition::Start => messages::start(service),
        Transition::Stop => messages::stop(service),
    };
    let mut stream = match client.open_stream(request).await {
        Ok(stream) => stream,
        Err(e) => return Verdict::from(e),
    };
    debug!("{} {} streaming on channel {}", transition.name(), service, stream.channel());

    let mut tracker = TransitionTracker::new(transition, service);
    loop {
        let update = match next_value(&mut stream).await.and_then(ServiceUpdate::try_from) {
            Ok(update) => update,
            Err(e) => return Verdict::from(e),
        };
        match &update {
            ServiceUpdate::Output { service, text } => console.line(format!("{}: {}", service, text.trim_end())),
            ServiceUpdate::State { service, state } => {
                debug!("{} -> {} ({})", service, state.description, state.code)
            }
            ServiceUpdate::RealTime => debug!("{} {}: real-time", transition.name(), service),
        }
        if let Progress::Done(verdict) = tracker.observe(&update) {
            stream.close();
            return verdict;
        }
    }
}
