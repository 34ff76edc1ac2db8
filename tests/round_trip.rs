//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Cross-dialect round-trip and rejection properties (§8.1).

use pretty_assertions::assert_eq;

use plistfmt::error::ErrorKind;
use plistfmt::value::{Date, Dict, Uid, UrlBase, Uuid};
use plistfmt::{decode_binary00, decode_binary15, decode_xml, encode_binary00, encode_binary15, encode_xml, Value};

#[test]
fn test_v00_round_trips_heterogeneous_array() {
    let value = Value::Array(vec![
        Value::Int(1),
        Value::Str("x".to_string()),
        Value::Data(vec![1, 2, 3]),
        Value::Real64(2.5),
        Value::Bool(false),
    ]);
    let bytes = encode_binary00(&value).unwrap();
    assert_eq!(decode_binary00(&bytes).unwrap(), value);
}

#[test]
fn test_v00_uniques_repeated_data_by_value_not_just_length() {
    // Two Data values of equal length but different content must not collapse into one
    // shared object even though Value's Hash impl only considers Data's length.
    let value = Value::Array(vec![Value::Data(vec![1, 2, 3]), Value::Data(vec![4, 5, 6])]);
    let bytes = encode_binary00(&value).unwrap();
    assert_eq!(decode_binary00(&bytes).unwrap(), value);
}

#[test]
fn test_v00_rejects_every_v15_only_variant() {
    for value in [
        Value::Null,
        Value::Uuid(Uuid::new([0; 16])),
        Value::Url { text: "x".to_string(), base: UrlBase::None },
        Value::Set(vec![Value::Bool(true)]),
        Value::Fill,
    ] {
        let err = encode_binary00(&value).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EncodingRejected);
    }
}

#[test]
fn test_v15_rejects_uid() {
    let err = encode_binary15(&Value::Uid(Uid::new(7))).unwrap_err();
    assert_eq!(err.kind, ErrorKind::EncodingRejected);
}

#[test]
fn test_v15_round_trips_date() {
    let value = Value::Date(Date::from_absolute_time(86400.5));
    let bytes = encode_binary15(&value).unwrap();
    assert_eq!(decode_binary15(&bytes).unwrap(), value);
}

#[test]
fn test_v15_round_trips_nested_set_inside_dict() {
    let mut dict = Dict::new();
    dict.insert("tags", Value::Set(vec![Value::Str("a".to_string()), Value::Str("b".to_string())]));
    let value = Value::Dict(dict);
    let bytes = encode_binary15(&value).unwrap();
    assert_eq!(decode_binary15(&bytes).unwrap(), value);
}

#[test]
fn test_xml_round_trips_uid_and_uuid_comment_conventions() {
    let mut dict = Dict::new();
    dict.insert("id", Value::Uid(Uid::new(42)));
    dict.insert("guid", Value::Uuid(Uuid::new([0xAB; 16])));
    let value = Value::Dict(dict);
    let bytes = encode_xml(&value).unwrap();
    assert_eq!(decode_xml(&bytes).unwrap(), value);
}

#[test]
fn test_set_equality_is_order_insensitive() {
    let a = Value::Set(vec![Value::Int(1), Value::Int(2)]);
    let b = Value::Set(vec![Value::Int(2), Value::Int(1)]);
    assert_eq!(a, b);
}

#[test]
fn test_array_equality_is_order_sensitive() {
    let a = Value::Array(vec![Value::Int(1), Value::Int(2)]);
    let b = Value::Array(vec![Value::Int(2), Value::Int(1)]);
    assert_ne!(a, b);
}

#[test]
fn test_dict_preserves_insertion_order_through_v00_round_trip() {
    let mut dict = Dict::new();
    dict.insert("z", Value::Int(1));
    dict.insert("a", Value::Int(2));
    dict.insert("m", Value::Int(3));
    let value = Value::Dict(dict);
    let bytes = encode_binary00(&value).unwrap();
    let decoded = decode_binary00(&bytes).unwrap();
    let decoded_dict = decoded.as_dict().unwrap();
    assert_eq!(decoded_dict.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
}
