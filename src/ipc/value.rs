//! Tagged value codec.
//!
//! Every value on the wire is a `(type, length, payload)` triple. Scalars are
//! fixed-width little-endian integers, text and binary values are raw bytes,
//! and a `Struct` payload is a concatenation of member triples with no
//! channel field.

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{NgcsError, Result};

/// Size of a `(type, length)` member header inside a struct payload.
pub const MEMBER_HEADER_SIZE: usize = 8;

/// Largest payload a length field can describe.
pub const MAX_PAYLOAD_LENGTH: usize = i32::MAX as usize;

/// Deepest struct nesting accepted on decode.
pub const MAX_DEPTH: usize = 64;

/// Wire type tags.
///
/// Tag `5` exists in the numbering but has no meaning; it is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeCode {
    None = 0,
    Int32 = 1,
    String = 2,
    Blob = 3,
    Int64 = 4,
    Struct = 6,
    Bool = 7,
    Error = 8,
}

impl TypeCode {
    /// The reserved, never-produced tag.
    pub const RESERVED: i32 = 5;

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeCode::None => "none",
            TypeCode::Int32 => "int",
            TypeCode::String => "string",
            TypeCode::Blob => "blob",
            TypeCode::Int64 => "long",
            TypeCode::Struct => "struct",
            TypeCode::Bool => "bool",
            TypeCode::Error => "error",
        }
    }
}

impl TryFrom<i32> for TypeCode {
    type Error = NgcsError;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(TypeCode::None),
            1 => Ok(TypeCode::Int32),
            2 => Ok(TypeCode::String),
            3 => Ok(TypeCode::Blob),
            4 => Ok(TypeCode::Int64),
            6 => Ok(TypeCode::Struct),
            7 => Ok(TypeCode::Bool),
            8 => Ok(TypeCode::Error),
            TypeCode::RESERVED => Err(NgcsError::decode("reserved type tag 5")),
            other => Err(NgcsError::decode(format!("unknown type tag {}", other))),
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded wire value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    None,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    /// Raw bytes, rendered as text by clients.
    String(Vec<u8>),
    Blob(Vec<u8>),
    Struct(Vec<Value>),
    /// Opaque failure description from the daemon.
    Error(Vec<u8>),
}

impl Value {
    /// Build a struct value from ordered members.
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Struct(items.into_iter().collect())
    }

    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Value::Blob(data.into())
    }

    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::None => TypeCode::None,
            Value::Bool(_) => TypeCode::Bool,
            Value::Int32(_) => TypeCode::Int32,
            Value::Int64(_) => TypeCode::Int64,
            Value::String(_) => TypeCode::String,
            Value::Blob(_) => TypeCode::Blob,
            Value::Struct(_) => TypeCode::Struct,
            Value::Error(_) => TypeCode::Error,
        }
    }

    /// Payload length in bytes, excluding this value's own header.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::None => 0,
            Value::Bool(_) | Value::Int32(_) => 4,
            Value::Int64(_) => 8,
            Value::String(bytes) | Value::Blob(bytes) | Value::Error(bytes) => bytes.len(),
            Value::Struct(items) => items
                .iter()
                .map(|item| MEMBER_HEADER_SIZE + item.encoded_len())
                .sum(),
        }
    }

    /// Append this value's payload to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Value::None => {}
            Value::Bool(flag) => out.put_i32_le(i32::from(*flag)),
            Value::Int32(n) => out.put_i32_le(*n),
            Value::Int64(n) => out.put_i64_le(*n),
            Value::String(bytes) | Value::Blob(bytes) | Value::Error(bytes) => out.put_slice(bytes),
            Value::Struct(items) => {
                for item in items {
                    out.put_i32_le(item.type_code().as_i32());
                    out.put_i32_le(wire_length(item.encoded_len()));
                    item.encode(out);
                }
            }
        }
    }

    /// Encode into a `(type, payload)` pair.
    ///
    /// A payload over [`MAX_PAYLOAD_LENGTH`] cannot be described on the wire;
    /// use [`Value::try_pack`] when the size is not otherwise bounded.
    pub fn pack(&self) -> (TypeCode, Bytes) {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut out);
        (self.type_code(), out.freeze())
    }

    /// Encode into a `(type, payload)` pair, refusing payloads whose length
    /// does not fit a length field. Nested lengths never exceed the total.
    pub fn try_pack(&self) -> Result<(TypeCode, Bytes)> {
        check_payload_length(self.encoded_len())?;
        Ok(self.pack())
    }

    /// Decode a payload carried under `tag`.
    pub fn unpack(tag: i32, payload: &[u8]) -> Result<Value> {
        unpack_at(tag, payload, 0)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Text of a `String` value, lossily converted.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::String(bytes) => Some(String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Value]> {
        match self {
            Value::Struct(items) => Some(items),
            _ => None,
        }
    }

    /// Message carried by an `Error` value.
    pub fn error_message(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Error(bytes) => Some(String::from_utf8_lossy(bytes)),
            _ => None,
        }
    }
}

/// Fail when `length` cannot be described by a length field.
pub fn check_payload_length(length: usize) -> Result<()> {
    if length > MAX_PAYLOAD_LENGTH {
        return Err(NgcsError::protocol(format!(
            "payload of {} bytes exceeds the {}-byte wire limit",
            length, MAX_PAYLOAD_LENGTH
        )));
    }
    Ok(())
}

/// Length as written in a header. Saturates instead of wrapping; callers
/// that cannot bound the size check with [`check_payload_length`] first.
pub(crate) fn wire_length(length: usize) -> i32 {
    i32::try_from(length).unwrap_or(i32::MAX)
}

/// Free-function form of [`Value::pack`].
pub fn pack(value: &Value) -> (TypeCode, Bytes) {
    value.pack()
}

/// Free-function form of [`Value::unpack`].
pub fn unpack(tag: i32, payload: &[u8]) -> Result<Value> {
    Value::unpack(tag, payload)
}

fn unpack_at(tag: i32, payload: &[u8], depth: usize) -> Result<Value> {
    let code = TypeCode::try_from(tag)?;
    let value = match code {
        TypeCode::None => {
            if !payload.is_empty() {
                return Err(NgcsError::decode(format!(
                    "none value carries {} payload bytes",
                    payload.len()
                )));
            }
            Value::None
        }
        TypeCode::Bool => Value::Bool(i32::from_le_bytes(fixed(code, payload)?) != 0),
        TypeCode::Int32 => Value::Int32(i32::from_le_bytes(fixed(code, payload)?)),
        TypeCode::Int64 => Value::Int64(i64::from_le_bytes(fixed(code, payload)?)),
        TypeCode::String => Value::String(payload.to_vec()),
        TypeCode::Blob => Value::Blob(payload.to_vec()),
        TypeCode::Error => Value::Error(payload.to_vec()),
        TypeCode::Struct => {
            if depth >= MAX_DEPTH {
                return Err(NgcsError::decode(format!("struct nesting deeper than {}", MAX_DEPTH)));
            }
            let items = members(payload)
                .map(|member| member.and_then(|(tag, body)| unpack_at(tag, body, depth + 1)))
                .collect::<Result<Vec<_>>>()?;
            Value::Struct(items)
        }
    };
    Ok(value)
}

fn fixed<const N: usize>(code: TypeCode, payload: &[u8]) -> Result<[u8; N]> {
    payload.try_into().map_err(|_| {
        NgcsError::decode(format!(
            "{} payload must be {} bytes, got {}",
            code,
            N,
            payload.len()
        ))
    })
}

/// Iterate the member triples of a struct payload.
///
/// The member count is never assumed; iteration stops when the buffer is
/// exhausted. A malformed member yields one error and ends the iteration.
pub fn members(payload: &[u8]) -> Members<'_> {
    Members { buf: payload }
}

/// Iterator over `(tag, payload)` members of a struct payload.
#[derive(Debug, Clone)]
pub struct Members<'a> {
    buf: &'a [u8],
}

impl<'a> Members<'a> {
    fn fail(&mut self, message: String) -> Option<Result<(i32, &'a [u8])>> {
        self.buf = &[];
        Some(Err(NgcsError::Decode(message)))
    }
}

impl<'a> Iterator for Members<'a> {
    type Item = Result<(i32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < MEMBER_HEADER_SIZE {
            let left = self.buf.len();
            return self.fail(format!("truncated member header: {} bytes left", left));
        }

        let mut header = &self.buf[..MEMBER_HEADER_SIZE];
        let tag = header.get_i32_le();
        let length = header.get_i32_le();
        let rest = &self.buf[MEMBER_HEADER_SIZE..];

        if length < 0 {
            return self.fail(format!("negative member length {}", length));
        }
        let length = length as usize;
        if length > rest.len() {
            let left = rest.len();
            return self.fail(format!("member length {} exceeds remaining {} bytes", length, left));
        }

        let (body, tail) = rest.split_at(length);
        self.buf = tail;
        Some(Ok((tag, body)))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(flag) => write!(f, "{}", flag),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "{}", n),
            Value::String(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Value::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
            Value::Error(bytes) => write!(f, "error: {}", String::from_utf8_lossy(bytes)),
            Value::Struct(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text.into_bytes())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Struct(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}
