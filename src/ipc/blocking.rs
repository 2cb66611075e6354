//! Blocking one-shot transport.
//!
//! Used for batches made only of simple commands, where no channel ever
//! opens. Timeouts apply at the socket level only.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{NgcsError, Result};
use crate::ipc::client::ClientConfig;
use crate::ipc::codec::{Frame, FrameCodec};
use crate::ipc::demux::DEFAULT_CHANNEL;
use crate::ipc::value::Value;

const READ_CHUNK: usize = 4096;

/// Synchronous request/response client for channel 0.
#[derive(Debug)]
pub struct BlockingClient {
    stream: UnixStream,
    codec: FrameCodec,
    read_buf: BytesMut,
    broken: bool,
}

impl BlockingClient {
    /// Connect and apply the configured socket timeouts.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = UnixStream::connect(&config.socket_path)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        info!("Connected to {} (blocking)", config.socket_path.display());
        Ok(Self::from_stream(stream, config.codec()))
    }

    pub fn from_stream(stream: UnixStream, codec: FrameCodec) -> Self {
        Self {
            stream,
            codec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            broken: false,
        }
    }

    /// Send one request and block until its response arrives.
    ///
    /// Frames on other channels are skipped; none should exist on a
    /// connection that never opened one. A transport failure while writing
    /// or reading (timeout, oversize frame, hangup) leaves the connection
    /// broken: a late answer would otherwise be matched to the next request,
    /// so every later call fails with `Disconnected`.
    pub fn call(&mut self, request: &Value) -> Result<Value> {
        if self.broken {
            return Err(NgcsError::Disconnected);
        }
        let mut out = BytesMut::new();
        // An oversize request is refused before anything is written.
        self.codec.encode(Frame::data(DEFAULT_CHANNEL, request), &mut out)?;
        match self.exchange(&out) {
            Ok(frame) => frame.value(),
            Err(e) => {
                warn!("Blocking connection unusable: {}", e);
                self.broken = true;
                Err(e)
            }
        }
    }

    /// True once a transport failure has made the connection unusable.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn exchange(&mut self, out: &[u8]) -> Result<Frame> {
        self.stream.write_all(out)?;
        self.stream.flush()?;

        loop {
            let frame = self.read_frame()?;
            if frame.channel == DEFAULT_CHANNEL {
                return Ok(frame);
            }
            debug!("Ignoring frame on channel {}", frame.channel);
        }
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                return Ok(frame);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(NgcsError::Disconnected);
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}
