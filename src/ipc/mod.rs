//! IPC layer - control-socket protocol client
//!
//! This module provides:
//! - Tagged values and their wire encoding
//! - Frame codec over the byte stream
//! - Channel demultiplexer with the channel-0 response queue
//! - Async session client and a blocking one-shot transport
//! - Typed views over command payloads

pub mod blocking;
pub mod client;
pub mod codec;
pub mod demux;
pub mod messages;
pub mod value;

pub use blocking::BlockingClient;
pub use client::{ChannelStream, Client, ClientConfig, DEFAULT_SOCKET_PATH, SOCKET_ENV};
pub use codec::{Frame, FrameBody, FrameCodec, decode_frame, encode_frame};
pub use demux::{ChannelEvent, DEFAULT_CHANNEL, Demux};
pub use messages::{ErrorReport, ServiceState, ServiceUpdate, StateCode, StatusEntry};
pub use value::{TypeCode, Value, pack, unpack};
