//! Runtime support for generated marshal code.
//!
//! `ngcs-gen` emits `Marshal` and `Unmarshal` impls that drive the two
//! helpers in this module:
//! - [`StructWriter`] walks a record once per call. Called with no sink it
//!   only counts bytes; called with a sink it writes the same bytes. Sizing
//!   and writing share one code path, so the computed length always equals
//!   the written length.
//! - [`StructReader`] splits a struct payload into members, checks the member
//!   count, and hands out typed fields. Fields decoded before a failure are
//!   owned locals of the generated function and are dropped when it returns
//!   the error, so there is no separate free/rollback step.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{NgcsError, Result};
use crate::ipc::codec::{Frame, FrameBody};
use crate::ipc::value::{MEMBER_HEADER_SIZE, TypeCode, check_payload_length, members, wire_length};

/// Encode a record into struct-member form.
pub trait Marshal {
    /// Return the wire length of `self`; write the encoding when `out` is given.
    fn marshal(&self, out: Option<&mut BytesMut>) -> usize;

    /// Size, then encode, into a fresh buffer.
    ///
    /// Records over [`MAX_PAYLOAD_LENGTH`](crate::ipc::value::MAX_PAYLOAD_LENGTH)
    /// cannot be described on the wire; see [`Marshal::try_to_payload`].
    fn to_payload(&self) -> Bytes {
        let length = self.marshal(None);
        let mut buf = BytesMut::with_capacity(length);
        let written = self.marshal(Some(&mut buf));
        debug_assert_eq!(length, written);
        buf.freeze()
    }

    /// Like [`Marshal::to_payload`], but the size pass rejects a record too
    /// large for a length field before anything is written.
    fn try_to_payload(&self) -> Result<Bytes> {
        check_payload_length(self.marshal(None))?;
        Ok(self.to_payload())
    }

    /// Wrap the encoding in a struct-typed data frame.
    fn to_frame(&self, channel: i32) -> Frame {
        Frame::raw(channel, TypeCode::Struct.as_i32(), self.to_payload())
    }
}

/// Decode a record from struct-member form.
pub trait Unmarshal: Sized {
    /// Decode from a struct payload (the bytes after the value header).
    fn unmarshal(payload: &[u8]) -> Result<Self>;

    /// Decode from a frame that must carry a struct value.
    fn from_frame(frame: &Frame) -> Result<Self> {
        match &frame.body {
            FrameBody::Data { tag, payload } if *tag == TypeCode::Struct.as_i32() => Self::unmarshal(payload),
            FrameBody::Data { tag, .. } => Err(NgcsError::decode(format!(
                "expected a struct frame, got tag {}",
                tag
            ))),
            FrameBody::Close { code } => Err(NgcsError::ChannelClosed {
                channel: frame.channel,
                code: *code,
            }),
        }
    }
}

/// Single-pass sized writer for struct members.
#[derive(Debug)]
pub struct StructWriter<'a> {
    out: Option<&'a mut BytesMut>,
    length: usize,
}

impl<'a> StructWriter<'a> {
    pub fn new(out: Option<&'a mut BytesMut>) -> Self {
        Self { out, length: 0 }
    }

    fn header(&mut self, code: TypeCode, length: usize) {
        self.length += MEMBER_HEADER_SIZE + length;
        if let Some(out) = self.out.as_deref_mut() {
            out.put_i32_le(code.as_i32());
            out.put_i32_le(wire_length(length));
        }
    }

    fn member(&mut self, code: TypeCode, payload: &[u8]) {
        self.header(code, payload.len());
        if let Some(out) = self.out.as_deref_mut() {
            out.put_slice(payload);
        }
    }

    pub fn int(&mut self, value: i32) {
        self.member(TypeCode::Int32, &value.to_le_bytes());
    }

    pub fn long(&mut self, value: i64) {
        self.member(TypeCode::Int64, &value.to_le_bytes());
    }

    /// Text up to the first NUL byte.
    pub fn string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.member(TypeCode::String, &bytes[..end]);
    }

    /// Text or binary with an explicit length, clamped to the data present.
    pub fn sized(&mut self, code: TypeCode, data: &[u8], length: usize) {
        let end = length.min(data.len());
        self.member(code, &data[..end]);
    }

    pub fn none(&mut self) {
        self.member(TypeCode::None, &[]);
    }

    /// Embedded record: sized with a counting pass before its header goes out.
    pub fn record<T: Marshal + ?Sized>(&mut self, record: &T) {
        let length = record.marshal(None);
        self.header(TypeCode::Struct, length);
        if let Some(out) = self.out.as_deref_mut() {
            record.marshal(Some(out));
        }
    }

    /// Optional embedded record; `None` goes out as a none member.
    pub fn optional<T: Marshal + ?Sized>(&mut self, record: Option<&T>) {
        match record {
            Some(record) => self.record(record),
            None => self.none(),
        }
    }

    /// Total length walked so far.
    pub fn finish(self) -> usize {
        self.length
    }
}

/// Counted, type-checked reader over struct members.
#[derive(Debug)]
pub struct StructReader<'a> {
    type_name: &'static str,
    members: std::vec::IntoIter<(i32, &'a [u8])>,
}

impl<'a> StructReader<'a> {
    /// Split `payload` and require exactly `expected` members.
    pub fn new(type_name: &'static str, payload: &'a [u8], expected: usize) -> Result<Self> {
        let members = members(payload)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| NgcsError::Decode(format!("{}: {}", type_name, detail(e))))?;
        if members.len() != expected {
            return Err(NgcsError::Decode(format!(
                "{}: expected {} members, found {}",
                type_name,
                expected,
                members.len()
            )));
        }
        Ok(Self {
            type_name,
            members: members.into_iter(),
        })
    }

    fn error(&self, field: &str, message: impl std::fmt::Display) -> NgcsError {
        NgcsError::Decode(format!("{}.{}: {}", self.type_name, field, message))
    }

    fn next_member(&mut self, field: &str) -> Result<(i32, &'a [u8])> {
        self.members
            .next()
            .ok_or_else(|| self.error(field, "missing member"))
    }

    fn take(&mut self, field: &str, want: TypeCode) -> Result<&'a [u8]> {
        let (tag, body) = self.next_member(field)?;
        if tag != want.as_i32() {
            return Err(self.error(field, format!("expected {}, found tag {}", want, tag)));
        }
        Ok(body)
    }

    fn fixed<const N: usize>(&self, field: &str, body: &[u8]) -> Result<[u8; N]> {
        body.try_into()
            .map_err(|_| self.error(field, format!("expected {} bytes, found {}", N, body.len())))
    }

    pub fn int(&mut self, field: &str) -> Result<i32> {
        let body = self.take(field, TypeCode::Int32)?;
        Ok(i32::from_le_bytes(self.fixed(field, body)?))
    }

    pub fn long(&mut self, field: &str) -> Result<i64> {
        let body = self.take(field, TypeCode::Int64)?;
        Ok(i64::from_le_bytes(self.fixed(field, body)?))
    }

    pub fn string(&mut self, field: &str) -> Result<String> {
        let body = self.take(field, TypeCode::String)?;
        Ok(String::from_utf8_lossy(body).into_owned())
    }

    /// Variable-length text or blob, returned with its wire length.
    pub fn sized(&mut self, field: &str, code: TypeCode) -> Result<(Vec<u8>, usize)> {
        let body = self.take(field, code)?;
        Ok((body.to_vec(), body.len()))
    }

    pub fn record<T: Unmarshal>(&mut self, field: &str) -> Result<T> {
        let body = self.take(field, TypeCode::Struct)?;
        T::unmarshal(body).map_err(|e| self.error(field, detail(e)))
    }

    /// Optional record: allocated only when the member is not none.
    pub fn optional<T: Unmarshal>(&mut self, field: &str) -> Result<Option<Box<T>>> {
        let (tag, body) = self.next_member(field)?;
        match TypeCode::try_from(tag) {
            Ok(TypeCode::None) if body.is_empty() => Ok(None),
            Ok(TypeCode::Struct) => T::unmarshal(body)
                .map(|record| Some(Box::new(record)))
                .map_err(|e| self.error(field, detail(e))),
            _ => Err(self.error(field, format!("expected struct or none, found tag {}", tag))),
        }
    }
}

fn detail(err: NgcsError) -> String {
    match err {
        NgcsError::Decode(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicIsize, Ordering};

    use crate::ipc::value::Value;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Exit {
        code: i32,
        signal: i32,
    }

    impl Marshal for Exit {
        fn marshal(&self, out: Option<&mut BytesMut>) -> usize {
            let mut w = StructWriter::new(out);
            w.int(self.code);
            w.int(self.signal);
            w.finish()
        }
    }

    impl Unmarshal for Exit {
        fn unmarshal(payload: &[u8]) -> Result<Self> {
            let mut r = StructReader::new("Exit", payload, 2)?;
            let code = r.int("code")?;
            let signal = r.int("signal")?;
            Ok(Self { code, signal })
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Service {
        name: String,
        data: Vec<u8>,
        data_len: usize,
        started: i64,
        exit: Exit,
        parent: Option<Box<Exit>>,
        cache: Option<Vec<u8>>,
    }

    impl Marshal for Service {
        fn marshal(&self, out: Option<&mut BytesMut>) -> usize {
            let mut w = StructWriter::new(out);
            w.string(&self.name);
            w.sized(TypeCode::Blob, &self.data, self.data_len);
            w.long(self.started);
            w.record(&self.exit);
            w.optional(self.parent.as_deref());
            w.finish()
        }
    }

    impl Unmarshal for Service {
        fn unmarshal(payload: &[u8]) -> Result<Self> {
            let mut r = StructReader::new("Service", payload, 5)?;
            let name = r.string("name")?;
            let (data, data_len) = r.sized("data", TypeCode::Blob)?;
            let started = r.long("started")?;
            let exit = r.record::<Exit>("exit")?;
            let parent = r.optional::<Exit>("parent")?;
            let cache = None;
            Ok(Self {
                name,
                data,
                data_len,
                started,
                exit,
                parent,
                cache,
            })
        }
    }

    fn sample() -> Service {
        Service {
            name: "sshd".to_string(),
            data: vec![1, 2, 3, 0, 5],
            data_len: 5,
            started: 1_700_000_000_000,
            exit: Exit { code: 0, signal: 15 },
            parent: Some(Box::new(Exit { code: 1, signal: 0 })),
            cache: None,
        }
    }

    #[test]
    fn test_size_pass_matches_write_pass() {
        let service = sample();
        let size = service.marshal(None);
        let mut buf = BytesMut::new();
        let written = service.marshal(Some(&mut buf));
        assert_eq!(size, written);
        assert_eq!(size, buf.len());
    }

    #[test]
    fn test_roundtrip() {
        let service = sample();
        let decoded = Service::unmarshal(&service.to_payload()).unwrap();
        assert_eq!(decoded, service);
    }

    #[test]
    fn test_roundtrip_without_optional() {
        let service = Service {
            parent: None,
            ..sample()
        };
        let decoded = Service::unmarshal(&service.to_payload()).unwrap();
        assert!(decoded.parent.is_none());
        assert_eq!(decoded, service);
    }

    #[test]
    fn test_matches_generic_value_codec() {
        let payload = sample().to_payload();
        let value = Value::unpack(TypeCode::Struct.as_i32(), &payload).unwrap();
        let items = value.as_struct().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], Value::from("sshd"));
        assert_eq!(items[3], Value::tuple([Value::Int32(0), Value::Int32(15)]));
    }

    #[test]
    fn test_ignored_local_field_is_reset() {
        let service = Service {
            cache: Some(vec![9, 9]),
            ..sample()
        };
        let decoded = Service::unmarshal(&service.to_payload()).unwrap();
        assert!(decoded.cache.is_none());
    }

    #[test]
    fn test_string_stops_at_nul() {
        let service = Service {
            name: "ab\0cd".to_string(),
            ..sample()
        };
        let decoded = Service::unmarshal(&service.to_payload()).unwrap();
        assert_eq!(decoded.name, "ab");
    }

    #[test]
    fn test_sized_clamps_to_length_field() {
        let service = Service {
            data: vec![1, 2, 3, 4],
            data_len: 2,
            ..sample()
        };
        let decoded = Service::unmarshal(&service.to_payload()).unwrap();
        assert_eq!(decoded.data, vec![1, 2]);
        assert_eq!(decoded.data_len, 2);

        let overlong = Service {
            data: vec![7],
            data_len: 50,
            ..sample()
        };
        assert_eq!(overlong.marshal(None), sample_len_with_data(1));
    }

    fn sample_len_with_data(data: usize) -> usize {
        let base = Service {
            data: Vec::new(),
            data_len: 0,
            ..sample()
        };
        base.marshal(None) + data
    }

    #[test]
    fn test_member_count_mismatch() {
        let payload = Value::tuple([Value::Int32(1)]).pack().1;
        let err = Exit::unmarshal(&payload).unwrap_err();
        assert!(err.to_string().contains("expected 2 members, found 1"));

        let payload = Value::tuple([Value::Int32(1), Value::Int32(2), Value::Int32(3)]).pack().1;
        assert!(Exit::unmarshal(&payload).is_err());
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let payload = Value::tuple([Value::Int32(1), Value::from("x")]).pack().1;
        let err = Exit::unmarshal(&payload).unwrap_err();
        assert!(err.to_string().contains("Exit.signal"));
    }

    #[test]
    fn test_nested_error_has_path() {
        let mut service = Value::unpack(TypeCode::Struct.as_i32(), &sample().to_payload()).unwrap();
        if let Value::Struct(items) = &mut service {
            items[3] = Value::tuple([Value::Int32(0), Value::Int64(1)]);
        }
        let err = Service::unmarshal(&service.pack().1).unwrap_err();
        assert!(err.to_string().contains("Service.exit: Exit.signal"));
    }

    #[test]
    fn test_optional_rejects_scalar() {
        let mut service = Value::unpack(TypeCode::Struct.as_i32(), &sample().to_payload()).unwrap();
        if let Value::Struct(items) = &mut service {
            items[4] = Value::Int32(0);
        }
        assert!(Service::unmarshal(&service.pack().1).is_err());
    }

    #[test]
    fn test_from_frame() {
        let frame = sample().to_frame(4);
        assert_eq!(Service::from_frame(&frame).unwrap(), sample());

        let scalar = Frame::data(4, &Value::Int32(1));
        assert!(Service::from_frame(&scalar).is_err());

        let closed = Frame::close(4, -1);
        assert!(matches!(
            Service::from_frame(&closed),
            Err(NgcsError::ChannelClosed { channel: 4, code: -1 })
        ));
    }

    static LIVE: AtomicIsize = AtomicIsize::new(0);

    /// Record that counts live instances.
    #[derive(Debug)]
    struct Tracked;

    impl Drop for Tracked {
        fn drop(&mut self) {
            LIVE.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Unmarshal for Tracked {
        fn unmarshal(payload: &[u8]) -> Result<Self> {
            StructReader::new("Tracked", payload, 0)?;
            LIVE.fetch_add(1, Ordering::SeqCst);
            Ok(Tracked)
        }
    }

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Five {
        first: Tracked,
        second: Option<Box<Tracked>>,
        third: i32,
        fourth: String,
        fifth: i64,
    }

    impl Unmarshal for Five {
        fn unmarshal(payload: &[u8]) -> Result<Self> {
            let mut r = StructReader::new("Five", payload, 5)?;
            let first = r.record::<Tracked>("first")?;
            let second = r.optional::<Tracked>("second")?;
            let third = r.int("third")?;
            let fourth = r.string("fourth")?;
            let fifth = r.long("fifth")?;
            Ok(Self {
                first,
                second,
                third,
                fourth,
                fifth,
            })
        }
    }

    #[test]
    fn test_failure_on_third_field_releases_earlier_fields() {
        let good = Value::tuple([
            Value::Struct(Vec::new()),
            Value::Struct(Vec::new()),
            Value::Int32(3),
            Value::from("four"),
            Value::Int64(5),
        ]);
        let decoded = Five::unmarshal(&good.pack().1).unwrap();
        assert_eq!(LIVE.load(Ordering::SeqCst), 2);
        drop(decoded);
        assert_eq!(LIVE.load(Ordering::SeqCst), 0);

        let bad = Value::tuple([
            Value::Struct(Vec::new()),
            Value::Struct(Vec::new()),
            Value::from("not an int"),
            Value::from("four"),
            Value::Int64(5),
        ]);
        let err = Five::unmarshal(&bad.pack().1).unwrap_err();
        assert!(err.to_string().contains("Five.third"));
        assert_eq!(LIVE.load(Ordering::SeqCst), 0);
    }

    /// Reports a size past the wire limit without holding the bytes.
    struct Oversized;

    impl Marshal for Oversized {
        fn marshal(&self, out: Option<&mut BytesMut>) -> usize {
            assert!(out.is_none(), "oversized record must not be written");
            crate::ipc::value::MAX_PAYLOAD_LENGTH + 1
        }
    }

    #[test]
    fn test_try_to_payload_rejects_oversized_record() {
        let err = Oversized.try_to_payload().unwrap_err();
        assert!(matches!(err, NgcsError::Protocol(_)));

        let exit = Exit { code: 3, signal: 9 };
        assert_eq!(exit.try_to_payload().unwrap(), exit.to_payload());
    }
}
