//! Frame codec for the control socket.
//!
//! Frames are laid out as:
//! - 4 bytes: channel id (little-endian i32)
//! - 4 bytes: value type tag (little-endian i32)
//! - 4 bytes: payload length (little-endian i32)
//! - N bytes: payload
//!
//! A negative length marks a channel-close frame: no payload follows and the
//! length itself is the close code.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{NgcsError, Result};
use crate::ipc::value::{TypeCode, Value, wire_length};

/// Frame header size in bytes (channel + type + length).
pub const FRAME_HEADER_SIZE: usize = 12;

/// Default maximum payload size (16 MiB).
pub const DEFAULT_MAX_LENGTH: usize = 16 * 1024 * 1024;

/// Close code sent when the client drops a channel.
pub const CLOSE_CODE_LOCAL: i32 = -1;

/// What a frame carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Data { tag: i32, payload: Bytes },
    Close { code: i32 },
}

/// One unit of wire data on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: i32,
    pub body: FrameBody,
}

impl Frame {
    /// Create a data frame carrying an encoded value.
    pub fn data(channel: i32, value: &Value) -> Self {
        let (code, payload) = value.pack();
        Self::raw(channel, code.as_i32(), payload)
    }

    /// Create a data frame from an already encoded payload.
    pub fn raw(channel: i32, tag: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            body: FrameBody::Data {
                tag,
                payload: payload.into(),
            },
        }
    }

    /// Create a channel-close frame. Non-negative codes are clamped to -1.
    pub fn close(channel: i32, code: i32) -> Self {
        Self {
            channel,
            body: FrameBody::Close {
                code: if code < 0 { code } else { CLOSE_CODE_LOCAL },
            },
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self.body, FrameBody::Close { .. })
    }

    /// Decode the payload of a data frame.
    pub fn value(&self) -> Result<Value> {
        match &self.body {
            FrameBody::Data { tag, payload } => Value::unpack(*tag, payload),
            FrameBody::Close { code } => Err(NgcsError::ChannelClosed {
                channel: self.channel,
                code: *code,
            }),
        }
    }

    /// Total encoded size in bytes.
    pub fn wire_len(&self) -> usize {
        match &self.body {
            FrameBody::Data { payload, .. } => FRAME_HEADER_SIZE + payload.len(),
            FrameBody::Close { .. } => FRAME_HEADER_SIZE,
        }
    }
}

/// Length-prefixed frame codec.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_length: usize,
}

impl FrameCodec {
    /// Create a new codec with default max length (16 MiB).
    pub fn new() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    /// Create a new codec with custom max length.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.min(i32::MAX as usize),
        }
    }

    /// Get the max payload length.
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let mut header = &src[..FRAME_HEADER_SIZE];
        let channel = header.get_i32_le();
        let tag = header.get_i32_le();
        let length = header.get_i32_le();

        if length < 0 {
            src.advance(FRAME_HEADER_SIZE);
            return Ok(Some(Frame {
                channel,
                body: FrameBody::Close { code: length },
            }));
        }

        let length = length as usize;
        if length > self.max_length {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Frame too large: {} > {}", length, self.max_length),
            ));
        }

        if src.len() < FRAME_HEADER_SIZE + length {
            // Reserve space for the rest of the frame
            src.reserve(FRAME_HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        Ok(Some(Frame {
            channel,
            body: FrameBody::Data { tag, payload },
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        match frame.body {
            FrameBody::Data { tag, payload } => {
                if payload.len() > self.max_length {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Frame too large: {} > {}", payload.len(), self.max_length),
                    ));
                }
                dst.reserve(FRAME_HEADER_SIZE + payload.len());
                dst.put_i32_le(frame.channel);
                dst.put_i32_le(tag);
                dst.put_i32_le(wire_length(payload.len()));
                dst.put_slice(&payload);
            }
            FrameBody::Close { code } => {
                dst.reserve(FRAME_HEADER_SIZE);
                dst.put_i32_le(frame.channel);
                dst.put_i32_le(TypeCode::None.as_i32());
                dst.put_i32_le(code);
            }
        }
        Ok(())
    }
}

/// Encode a frame to bytes.
pub fn encode_frame(frame: Frame) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(frame.wire_len());
    FrameCodec::new().encode(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode exactly one frame from bytes.
pub fn decode_frame(data: &[u8]) -> Result<Frame> {
    let mut buf = BytesMut::from(data);
    match FrameCodec::new().decode(&mut buf)? {
        Some(frame) if buf.is_empty() => Ok(frame),
        Some(_) => Err(NgcsError::decode(format!("{} trailing bytes after frame", buf.len()))),
        None => Err(NgcsError::decode("Incomplete frame")),
    }
}
