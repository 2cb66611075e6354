//! Channel demultiplexer.
//!
//! Owns the per-connection routing state:
//! - channel table mapping channel id to its handler
//! - FIFO of pending response callbacks for channel 0
//! - outbound queue of frames produced while dispatching
//!
//! Channel 0 has no request ids: responses are matched to requests purely by
//! send order. A daemon that reorders responses would go undetected.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::error::{NgcsError, Result};
use crate::ipc::codec::{CLOSE_CODE_LOCAL, Frame, FrameBody};
use crate::ipc::value::Value;

/// The reserved request/response channel.
pub const DEFAULT_CHANNEL: i32 = 0;

/// What a channel handler receives.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A data frame, decoded. Decode failures are confined to this event.
    Data(Result<Value>),
    /// The peer closed the channel with this code.
    Closed(i32),
}

/// Handler side of a registered channel.
pub type ChannelSender = mpsc::UnboundedSender<ChannelEvent>;

/// Callback for one channel-0 response. Receives the demultiplexer so it can
/// register a freshly assigned channel before the next frame is dispatched.
pub type ResponseCallback = Box<dyn FnOnce(&mut Demux, Result<Value>) + Send>;

/// Handler for frames on channels nobody registered.
pub type DefaultHandler = Box<dyn FnMut(i32, ChannelEvent) + Send>;

/// Routing state for one connection.
pub struct Demux {
    channels: HashMap<i32, ChannelSender>,
    pending: VecDeque<ResponseCallback>,
    outbound: VecDeque<Frame>,
    default_handler: DefaultHandler,
}

impl Default for Demux {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Demux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demux")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.len())
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

impl Demux {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            pending: VecDeque::new(),
            outbound: VecDeque::new(),
            default_handler: Box::new(log_unclaimed),
        }
    }

    /// Replace the handler for unregistered channels.
    pub fn set_default_handler(&mut self, handler: impl FnMut(i32, ChannelEvent) + Send + 'static) {
        self.default_handler = Box::new(handler);
    }

    /// Queue a channel-0 request and remember its callback.
    pub fn send_request(&mut self, request: &Value, on_reply: ResponseCallback) {
        self.pending.push_back(on_reply);
        self.outbound.push_back(Frame::data(DEFAULT_CHANNEL, request));
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Install a handler for `channel`. Fails for channel 0 or an id in use.
    pub fn register(&mut self, channel: i32, sender: ChannelSender) -> Result<()> {
        if channel == DEFAULT_CHANNEL {
            return Err(NgcsError::protocol("channel 0 is reserved"));
        }
        if self.channels.contains_key(&channel) {
            return Err(NgcsError::protocol(format!("channel {} is already open", channel)));
        }
        debug!("Registered channel {}", channel);
        self.channels.insert(channel, sender);
        Ok(())
    }

    pub fn is_registered(&self, channel: i32) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Close a channel from this side: drop its handler and queue a close frame.
    pub fn close(&mut self, channel: i32) {
        if self.channels.remove(&channel).is_some() {
            debug!("Closing channel {}", channel);
            self.outbound.push_back(Frame::close(channel, CLOSE_CODE_LOCAL));
        }
    }

    /// Frames waiting to be written, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Frame> {
        self.outbound.drain(..).collect()
    }

    /// Route one decoded frame.
    pub fn dispatch(&mut self, frame: Frame) {
        let channel = frame.channel;
        let event = match frame.body {
            FrameBody::Close { code } => ChannelEvent::Closed(code),
            FrameBody::Data { tag, payload } => ChannelEvent::Data(Value::unpack(tag, &payload)),
        };

        if channel == DEFAULT_CHANNEL {
            match self.pending.pop_front() {
                Some(on_reply) => {
                    let reply = match event {
                        ChannelEvent::Data(result) => result,
                        ChannelEvent::Closed(code) => Err(NgcsError::ChannelClosed { channel, code }),
                    };
                    on_reply(self, reply);
                }
                None => (self.default_handler)(channel, event),
            }
            return;
        }

        let closing = matches!(event, ChannelEvent::Closed(_));
        match self.channels.get(&channel) {
            Some(sender) => {
                if sender.send(event).is_err() {
                    // Handler went away without closing; tell the daemon.
                    self.close(channel);
                } else if closing {
                    debug!("Channel {} closed by peer", channel);
                    self.channels.remove(&channel);
                }
            }
            None => (self.default_handler)(channel, event),
        }
    }

    /// Fail every pending request and drop every channel handler.
    pub fn shutdown(&mut self) {
        while let Some(on_reply) = self.pending.pop_front() {
            on_reply(self, Err(NgcsError::Disconnected));
        }
        self.channels.clear();
        self.outbound.clear();
    }
}

fn log_unclaimed(channel: i32, event: ChannelEvent) {
    match event {
        ChannelEvent::Closed(code) => debug!("Close (code {}) for unknown channel {}", code, channel),
        ChannelEvent::Data(_) => warn!("Dropping frame for unknown channel {}", channel),
    }
}
