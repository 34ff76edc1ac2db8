//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Binary plist decoder, dialect v15: extended header parse and an inline recursive
//! object reader. Unlike v00 there is no offset table; containers nest their children's
//! bytes directly, so there is no back-reference mechanism and therefore nothing to
//! cycle-guard structurally — recursion simply bottoms out when the input is exhausted.

use log::{debug, trace};

use crate::error::{Error, ErrorKind, Result};
use crate::marker::{self, Kind};
use crate::path::Path;
use crate::primitive::BeInt;
use crate::value::{Date, Dict, UrlBase, Uuid, Value};

use super::parser;
use super::parser::Input;

const MIN_FILE_LEN: usize = 23;

/// Decodes a v15 binary plist document into a [`Value`].
pub fn decode(input: &[u8]) -> Result<Value> {
    let path = Path::root();

    if input.len() < MIN_FILE_LEN || &input[..marker::HEADER_SIZE] != marker::HEADER_MAGIC_V15 {
        return Err(Error::new(ErrorKind::MalformedHeader, path));
    }

    let rest = &input[marker::HEADER_SIZE..];
    let (rest, length_lead) = parser::lead(rest).map_err(|_| Error::new(ErrorKind::MalformedHeader, path.clone()))?;
    if length_lead.kind != Kind::Int || marker::int_width(length_lead.low) != 8 {
        return Err(Error::new(ErrorKind::MalformedHeader, path));
    }
    let (rest, length_value) = parser::int_payload(rest, 8).map_err(|_| Error::new(ErrorKind::MalformedHeader, path.clone()))?;
    let declared_len = match length_value {
        BeInt::Signed(v) if v >= 0 => v as usize,
        _ => return Err(Error::new(ErrorKind::MalformedHeader, path)),
    };
    if declared_len != input.len() {
        return Err(Error::new(ErrorKind::MalformedHeader, path));
    }

    let (rest, crc_lead) = parser::lead(rest).map_err(|_| Error::new(ErrorKind::MalformedHeader, path.clone()))?;
    if crc_lead.kind != Kind::Int || marker::int_width(crc_lead.low) != 4 {
        return Err(Error::new(ErrorKind::MalformedHeader, path));
    }
    let (rest, _crc) = parser::int_payload(rest, 4).map_err(|_| Error::new(ErrorKind::MalformedHeader, path.clone()))?;

    debug!("decoded bplist15 header: declared length {}", declared_len);

    let (_, value) = read_value(rest, &path, input.len() - rest.len())?;
    Ok(value)
}

fn read_value<'a>(input: Input<'a>, path: &Path, consumed_before: usize) -> Result<(Input<'a>, Value)> {
    let offset = consumed_before;
    let (rest, lead) = parser::lead(input).map_err(|_| Error::new(ErrorKind::MalformedMarker, path.clone()).at_offset(offset))?;
    trace!("v15 object at byte {}: {:?}", offset, lead.kind);

    let wrap_marker_err = |_| Error::new(ErrorKind::MalformedMarker, path.clone()).at_offset(offset);

    match lead.kind {
        Kind::Null => Ok((rest, Value::Null)),
        Kind::False => Ok((rest, Value::Bool(false))),
        Kind::True => Ok((rest, Value::Bool(true))),
        Kind::Fill => Ok((rest, Value::Fill)),
        Kind::Uuid => {
            let (rest, bytes) = parser::uuid_payload(rest).map_err(wrap_marker_err)?;
            Ok((rest, Value::Uuid(Uuid::new(bytes))))
        }
        Kind::Uid => Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset)),
        Kind::Int => {
            let width = marker::int_width(lead.low);
            let (rest, int_value) = parser::int_payload(rest, width).map_err(wrap_marker_err)?;
            Ok((rest, be_int_to_value(int_value)))
        }
        Kind::Real => {
            let (rest, real) = parser::real_payload(rest, lead.low).map_err(wrap_marker_err)?;
            let value = match real {
                parser::RealPayload::Single(v) => Value::Real32(v),
                parser::RealPayload::Double(v) => Value::Real64(v),
            };
            Ok((rest, value))
        }
        Kind::Date => {
            let (rest, secs) = parser::date_payload(rest).map_err(wrap_marker_err)?;
            Ok((rest, Value::Date(Date::from_absolute_time(secs))))
        }
        Kind::Data => {
            let (rest, bytes) = parser::data_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Ok((rest, Value::Data(bytes.to_vec())))
        }
        Kind::AsciiString => {
            let (rest, s) = parser::ascii_string_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Ok((rest, Value::Str(s.to_string())))
        }
        Kind::Utf16String => {
            let (rest, s) = parser::utf16_string_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Ok((rest, Value::Str(s)))
        }
        Kind::UrlNoBase => {
            let text_offset = input.len() - rest.len() + offset;
            let (rest, text_value) = read_value(rest, &path.array_element(0), text_offset)?;
            let text = match text_value {
                Value::Str(s) => s,
                _ => return Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset)),
            };
            Ok((rest, Value::Url { text, base: UrlBase::None }))
        }
        Kind::UrlWithBase => {
            let text_offset = input.len() - rest.len() + offset;
            let (rest, text_value) = read_value(rest, &path.array_element(0), text_offset)?;
            let text = match text_value {
                Value::Str(s) => s,
                _ => return Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset)),
            };
            let base_offset = input.len() - rest.len() + offset;
            let (rest, base_value) = read_value(rest, &path.array_element(1), base_offset)?;
            let base = match base_value {
                Value::Str(_) | Value::Url { .. } => UrlBase::Base(Box::new(base_value)),
                _ => return Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset)),
            };
            Ok((rest, Value::Url { text, base }))
        }
        Kind::Array => {
            let (mut rest, count) = parser::payload_count(rest, lead.low).map_err(wrap_marker_err)?;
            let mut items = Vec::with_capacity(count);
            for index in 0..count {
                let child_offset = offset + (input.len() - rest.len());
                let (remaining, value) = read_value(rest, &path.array_element(index), child_offset)?;
                items.push(value);
                rest = remaining;
            }
            Ok((rest, Value::Array(items)))
        }
        Kind::Set | Kind::OrderedSet => {
            let (mut rest, count) = parser::payload_count(rest, lead.low).map_err(wrap_marker_err)?;
            let mut items = Vec::with_capacity(count);
            for index in 0..count {
                let child_offset = offset + (input.len() - rest.len());
                let (remaining, value) = read_value(rest, &path.set_element(index), child_offset)?;
                items.push(value);
                rest = remaining;
            }
            Ok((rest, Value::Set(items)))
        }
        Kind::Dict => {
            let (mut rest, count) = parser::payload_count(rest, lead.low).map_err(wrap_marker_err)?;
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                let child_offset = offset + (input.len() - rest.len());
                let (remaining, value) = read_value(rest, path, child_offset)?;
                keys.push(value);
                rest = remaining;
            }
            let mut dict = Dict::with_capacity(count);
            for key_value in keys {
                let key = match key_value {
                    Value::Str(s) => s,
                    _ => return Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset)),
                };
                let child_offset = offset + (input.len() - rest.len());
                let (remaining, value) = read_value(rest, &path.dict_entry(key.clone()), child_offset)?;
                dict.insert(key, value);
                rest = remaining;
            }
            Ok((rest, Value::Dict(dict)))
        }
    }
}

fn be_int_to_value(value: BeInt) -> Value {
    match value {
        BeInt::Unsigned(v) => Value::Int(v as i64),
        BeInt::Signed(v) => Value::Int(v),
        BeInt::Big(v) => Value::BigInt(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(body: &[u8]) -> Vec<u8> {
        let mut bytes = b"bplist15".to_vec();
        bytes.push(0x13);
        bytes.extend(std::iter::repeat(0u8).take(8)); // length placeholder
        bytes.push(0x12);
        bytes.extend([0u8; 4]);
        bytes.extend_from_slice(body);
        let total_len = bytes.len() as i64;
        bytes[9..17].copy_from_slice(&total_len.to_be_bytes());
        bytes
    }

    #[test]
    fn test_decode_true() {
        let bytes = wrap(&[0x09]);
        assert_eq!(decode(&bytes).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_decode_null() {
        let bytes = wrap(&[0x00]);
        assert_eq!(decode(&bytes).unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_rejects_uid() {
        let bytes = wrap(&[0x80]);
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_decode_array_of_two_ints() {
        let bytes = wrap(&[0xA2, 0x10, 0x01, 0x10, 0x02]);
        let value = decode(&bytes).unwrap();
        assert_eq!(value, Value::Array(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_decode_set() {
        let bytes = wrap(&[0xC1, 0x09]);
        let value = decode(&bytes).unwrap();
        assert_eq!(value, Value::Set(vec![Value::Bool(true)]));
    }

    #[test]
    fn test_length_lie_is_malformed_header() {
        let mut bytes = wrap(&[0x09]);
        let len = bytes.len();
        bytes[9..17].copy_from_slice(&((len as i64) + 1).to_be_bytes());
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_too_short_file_is_malformed_header() {
        let bytes = b"bplist15".to_vec();
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_url_no_base() {
        // URL marker, then an inline ASCII string "a".
        let bytes = wrap(&[0x0C, 0x51, b'a']);
        let value = decode(&bytes).unwrap();
        assert_eq!(value, Value::Url { text: "a".to_string(), base: UrlBase::None });
    }
}
