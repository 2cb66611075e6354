//! Generated marshal code: generator output matches the checked-in units,
//! and the checked-in units behave on the wire.

use bytes::{BufMut, BytesMut};
use ngcs::NgcsError;
use ngcs::codegen::{self, Options};
use ngcs::ipc::value::{TypeCode, Value};
use ngcs::marshal::{Marshal, Unmarshal};

mod generated {
    include!("generated/service_types.rs");
    include!("generated/service_marshal.rs");
}

use generated::{EXIT_SIGNALED, Exit, Marker, Service};

const TEMPLATE: &str = include_str!("fixtures/service.ngcs");

fn normalized(source: &str) -> String {
    let file = syn::parse_file(source).expect("source parses");
    quote::quote!(#file).to_string()
}

fn sample() -> Service {
    Service {
        name: "sshd".to_string(),
        label: b"OpenSSH".to_vec(),
        label_len: 7,
        env: vec![0, 1, 2, 255],
        env_len: 4,
        started: 1_700_000_000_123,
        exit: Exit {
            code: EXIT_SIGNALED + 15,
            signal: 15,
        },
        parent: Some(Box::new(Exit { code: 0, signal: 0 })),
        cache: None,
    }
}

#[test]
fn test_generator_matches_checked_in_units() {
    let options = Options {
        source_name: "service.ngcs".to_string(),
        ..Options::default()
    };
    let units = codegen::generate(TEMPLATE, &options).unwrap();

    assert_eq!(
        normalized(&units.interface),
        normalized(include_str!("generated/service_types.rs"))
    );
    assert_eq!(
        normalized(&units.implementation),
        normalized(include_str!("generated/service_marshal.rs"))
    );
    assert!(units.interface.starts_with("// @generated by ngcs-gen from service.ngcs."));
}

#[test]
fn test_size_pass_equals_write_pass() {
    let service = sample();
    let sized = service.marshal(None);
    let mut buf = BytesMut::new();
    let written = service.marshal(Some(&mut buf));
    assert_eq!(sized, written);
    assert_eq!(buf.len(), written);
}

#[test]
fn test_roundtrip() {
    let service = sample();
    let decoded = Service::unmarshal(&service.to_payload()).unwrap();
    assert_eq!(decoded, service);

    let bare = Service {
        parent: None,
        ..sample()
    };
    assert_eq!(Service::unmarshal(&bare.to_payload()).unwrap(), bare);
}

#[test]
fn test_frame_roundtrip() {
    let service = sample();
    let frame = service.to_frame(4);
    assert_eq!(frame.channel, 4);
    assert_eq!(Service::from_frame(&frame).unwrap(), service);
}

#[test]
fn test_generic_value_view() {
    let payload = sample().to_payload();
    let value = Value::unpack(TypeCode::Struct.as_i32(), &payload).unwrap();
    let members = value.as_struct().unwrap();

    assert_eq!(members.len(), 6);
    assert_eq!(members[0], Value::from("sshd"));
    assert_eq!(members[1], Value::from("OpenSSH"));
    assert_eq!(members[2], Value::blob(vec![0, 1, 2, 255]));
    assert_eq!(members[3], Value::Int64(1_700_000_000_123));
    assert_eq!(members[4], Value::tuple([Value::Int32(143), Value::Int32(15)]));
    assert_eq!(members[5], Value::tuple([Value::Int32(0), Value::Int32(0)]));
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
fn test_sized_fields_clamp_and_take_wire_length() {
    let service = Service {
        label: b"short".to_vec(),
        label_len: 64,
        env: vec![9, 9, 9, 9],
        env_len: 2,
        ..sample()
    };
    let decoded = Service::unmarshal(&service.to_payload()).unwrap();
    assert_eq!(decoded.label, b"short");
    assert_eq!(decoded.label_len, 5);
    assert_eq!(decoded.env, vec![9, 9]);
    assert_eq!(decoded.env_len, 2);
}

#[test]
fn test_ignored_storage_never_travels() {
    let with_cache = Service {
        cache: Some(vec![1, 2, 3]),
        ..sample()
    };
    assert_eq!(with_cache.marshal(None), sample().marshal(None));
    assert_eq!(Service::unmarshal(&with_cache.to_payload()).unwrap().cache, None);
}

#[test]
fn test_member_count_mismatch() {
    let mut payload = BytesMut::from(&sample().to_payload()[..]);
    payload.put_i32_le(TypeCode::Int32.as_i32());
    payload.put_i32_le(4);
    payload.put_i32_le(1);
    let err = Service::unmarshal(&payload).unwrap_err();
    assert!(err.to_string().contains("expected 6 members, found 7"));

    let exit = Exit { code: 1, signal: 2 }.to_payload();
    assert!(matches!(Service::unmarshal(&exit), Err(NgcsError::Decode(_))));
}

#[test]
fn test_type_mismatch_names_field() {
    // long member replaced by an int
    let payload = Value::tuple([
        Value::from("sshd"),
        Value::from("x"),
        Value::blob(vec![]),
        Value::Int32(5),
        Value::tuple([Value::Int32(0), Value::Int32(0)]),
        Value::None,
    ])
    .pack()
    .1;
    let err = Service::unmarshal(&payload).unwrap_err();
    assert!(err.to_string().contains("Service.started"));
}

#[test]
fn test_nested_failure_names_path() {
    let payload = Value::tuple([
        Value::from("sshd"),
        Value::from("x"),
        Value::blob(vec![]),
        Value::Int64(5),
        Value::tuple([Value::Int32(0)]),
        Value::None,
    ])
    .pack()
    .1;
    let err = Service::unmarshal(&payload).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Service.exit"));
    assert!(message.contains("Exit: expected 2 members, found 1"));
}

#[test]
fn test_empty_record() {
    assert_eq!(Marker {}.marshal(None), 0);
    assert!(Marker::unmarshal(&[]).is_ok());
    assert!(Marker::unmarshal(&Exit::default().to_payload()).is_err());
}
