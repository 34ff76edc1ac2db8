//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! A native Rust codec for Apple property list documents, in XML and both binary
//! dialects (`bplist00`, `bplist15`).
//!
//! [`decode`] sniffs a document's dialect and parses it into a [`Value`] tree; [`encode`]
//! writes a [`Value`] tree back out in a chosen [`Format`]. Dialect-specific entry points
//! ([`decode_binary00`], [`encode_xml`], and so on) are available when the caller already
//! knows which wire format it is working with.

mod marker;
mod path;
mod primitive;

pub mod de;
pub mod error;
pub mod ser;
pub mod value;
pub mod xml;

pub use de::Dialect;
pub use error::{Error, ErrorKind, Result};
pub use path::Path;
pub use ser::Format;
pub use value::{Date, Dict, Uid, UrlBase, Uuid, Value};

/// Decodes `input`, sniffing its dialect from the header before dispatching.
pub fn decode(input: &[u8]) -> Result<Value> {
    de::decode(input)
}

/// Decodes `input` as a v00 binary plist document.
pub fn decode_binary00(input: &[u8]) -> Result<Value> {
    de::v00::decode(input)
}

/// Decodes `input` as a v15 binary plist document.
pub fn decode_binary15(input: &[u8]) -> Result<Value> {
    de::v15::decode(input)
}

/// Decodes `input` as an XML plist document.
pub fn decode_xml(input: &[u8]) -> Result<Value> {
    xml::decode(input)
}

/// Encodes `value` into `format`'s wire representation.
pub fn encode(value: &Value, format: Format) -> Result<Vec<u8>> {
    ser::encode(value, format)
}

/// Encodes `value` as a v00 binary plist document.
pub fn encode_binary00(value: &Value) -> Result<Vec<u8>> {
    ser::v00::encode(value)
}

/// Encodes `value` as a v15 binary plist document.
pub fn encode_binary15(value: &Value) -> Result<Vec<u8>> {
    ser::v15::encode(value)
}

/// Encodes `value` as an XML plist document.
pub fn encode_xml(value: &Value) -> Result<Vec<u8>> {
    xml::encode(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dispatches_by_sniffed_dialect() {
        let bytes = encode_binary00(&Value::Bool(true)).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_round_trip_every_format_for_a_plain_dict() {
        let mut dict = Dict::new();
        dict.insert("k", Value::Int(300));
        let value = Value::Dict(dict);

        for format in [Format::BinaryV00, Format::BinaryV15, Format::Xml] {
            let bytes = encode(&value, format).unwrap();
            assert_eq!(decode(&bytes).unwrap(), value);
        }
    }
}
