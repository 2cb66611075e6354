//! ngcs - Next Generation Control Socket
//!
//! Client side of the binary, multiplexed control protocol spoken by the
//! service supervision daemon:
//! - tagged values and their wire encoding
//! - framing and channel demultiplexing over one Unix socket
//! - command state machines for start, stop, status and error watching
//! - runtime support for, and a generator of, typed struct marshalling

pub mod codegen;
pub mod commands;
pub mod error;
pub mod ipc;
pub mod marshal;

pub use bytes;
pub use error::{NgcsError, Result};
