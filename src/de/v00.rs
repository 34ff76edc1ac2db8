//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Binary plist decoder, dialect v00: trailer parse, offset-table validation, and a
//! recursive object reader keyed by byte offsets into the original slice.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::error::{Error, ErrorKind, Result};
use crate::marker::{self, Kind};
use crate::path::Path;
use crate::primitive::BeInt;
use crate::value::{Date, Dict, Uid, Value};

use super::parser;

struct Trailer {
    offset_int_size: u8,
    object_ref_size: u8,
    num_objects: i64,
    top_object: i64,
    offset_table_offset: i64,
}

fn parse_trailer(bytes: &[u8], path: &Path) -> Result<Trailer> {
    debug_assert_eq!(bytes.len(), marker::TRAILER_SIZE);
    let sort_version_and_sizes = &bytes[marker::TRAILER_PREAMBLE_UNUSED_SIZE..8];
    let (_sort_version, offset_int_size, object_ref_size) =
        (sort_version_and_sizes[0], sort_version_and_sizes[1], sort_version_and_sizes[2]);
    let read_i64 = |slice: &[u8]| -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(slice);
        i64::from_be_bytes(buf)
    };
    let num_objects = read_i64(&bytes[8..16]);
    let top_object = read_i64(&bytes[16..24]);
    let offset_table_offset = read_i64(&bytes[24..32]);
    if offset_int_size == 0 || object_ref_size == 0 {
        return Err(Error::new(ErrorKind::MalformedTrailer, path.clone()));
    }
    Ok(Trailer { offset_int_size, object_ref_size, num_objects, top_object, offset_table_offset })
}

/// Decodes a v00 binary plist document into a [`Value`].
pub fn decode(input: &[u8]) -> Result<Value> {
    let path = Path::root();

    if input.len() < marker::HEADER_SIZE || &input[..marker::HEADER_SIZE] != marker::HEADER_MAGIC_V00 {
        return Err(Error::new(ErrorKind::MalformedHeader, path));
    }
    if input.len() < marker::HEADER_SIZE + marker::TRAILER_SIZE {
        return Err(Error::new(ErrorKind::MalformedTrailer, path));
    }

    let trailer_bytes = &input[input.len() - marker::TRAILER_SIZE..];
    let trailer = parse_trailer(trailer_bytes, &path)?;

    if trailer.num_objects < 0 || trailer.top_object < 0 || trailer.offset_table_offset < marker::HEADER_SIZE as i64 {
        return Err(Error::new(ErrorKind::MalformedTrailer, path));
    }
    let num_objects = trailer.num_objects as u64;
    let offset_table_offset = trailer.offset_table_offset as usize;
    let offset_int_size = trailer.offset_int_size as usize;
    let object_ref_size = trailer.object_ref_size as usize;

    if object_ref_size < 8 && (1u128 << (8 * object_ref_size as u32)) <= num_objects as u128 {
        return Err(Error::new(ErrorKind::MalformedTrailer, path));
    }
    if offset_int_size < 8 && (1u128 << (8 * offset_int_size as u32)) <= offset_table_offset as u128 {
        return Err(Error::new(ErrorKind::MalformedTrailer, path));
    }
    let expected_len = offset_table_offset + (num_objects as usize) * offset_int_size + marker::TRAILER_SIZE;
    if expected_len != input.len() {
        return Err(Error::new(ErrorKind::MalformedTrailer, path));
    }
    if trailer.top_object as u64 >= num_objects {
        return Err(Error::new(ErrorKind::MalformedTrailer, path));
    }

    let table_bytes = &input[offset_table_offset..offset_table_offset + (num_objects as usize) * offset_int_size];
    let (_, table) = parser::refs(table_bytes, num_objects as usize, offset_int_size)
        .map_err(|_| Error::new(ErrorKind::MalformedTrailer, path.clone()))?;
    for &offset in &table {
        if offset < marker::HEADER_SIZE || offset >= offset_table_offset {
            return Err(Error::new(ErrorKind::OffsetOutOfRange, path.clone()).at_offset(offset));
        }
    }

    debug!("decoded bplist00 header: {} objects, ref_size={}, offset_size={}", num_objects, object_ref_size, offset_int_size);

    let root_offset = table[trailer.top_object as usize];
    let mut cache = HashMap::new();
    let mut active_sets = HashSet::new();
    read_object(input, root_offset, &table, object_ref_size, &mut cache, &mut active_sets, &path)
}

fn resolve_ref(r: usize, table: &[usize], path: &Path) -> Result<usize> {
    table.get(r).copied().ok_or_else(|| Error::new(ErrorKind::RefOutOfRange, path.clone()))
}

fn be_int_to_value(value: BeInt) -> Value {
    match value {
        BeInt::Unsigned(v) => Value::Int(v as i64),
        BeInt::Signed(v) => Value::Int(v),
        BeInt::Big(v) => Value::BigInt(v),
    }
}

#[allow(clippy::too_many_arguments)]
fn read_object(
    input: &[u8],
    offset: usize,
    table: &[usize],
    ref_size: usize,
    cache: &mut HashMap<usize, Value>,
    active_sets: &mut HashSet<usize>,
    path: &Path,
) -> Result<Value> {
    if let Some(value) = cache.get(&offset) {
        return Ok(value.clone());
    }

    let slice = &input[offset..];
    let (rest, lead) = parser::lead(slice).map_err(|_| Error::new(ErrorKind::MalformedMarker, path.clone()).at_offset(offset))?;
    trace!("v00 object at {}: {:?}", offset, lead.kind);

    let wrap_marker_err = |_| Error::new(ErrorKind::MalformedMarker, path.clone()).at_offset(offset);

    let value = match lead.kind {
        Kind::Null | Kind::UrlNoBase | Kind::UrlWithBase | Kind::Uuid => {
            return Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset));
        }
        Kind::False => Value::Bool(false),
        Kind::True => Value::Bool(true),
        Kind::Fill => Value::Fill,
        Kind::Int => {
            let width = marker::int_width(lead.low);
            let (_, int_value) = parser::int_payload(rest, width).map_err(wrap_marker_err)?;
            be_int_to_value(int_value)
        }
        Kind::Real => {
            let (_, real) = parser::real_payload(rest, lead.low).map_err(wrap_marker_err)?;
            match real {
                parser::RealPayload::Single(v) => Value::Real32(v),
                parser::RealPayload::Double(v) => Value::Real64(v),
            }
        }
        Kind::Date => {
            let (_, secs) = parser::date_payload(rest).map_err(wrap_marker_err)?;
            Value::Date(Date::from_absolute_time(secs))
        }
        Kind::Data => {
            let (_, bytes) = parser::data_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Value::Data(bytes.to_vec())
        }
        Kind::AsciiString => {
            let (_, s) = parser::ascii_string_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Value::Str(s.to_string())
        }
        Kind::Utf16String => {
            let (_, s) = parser::utf16_string_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Value::Str(s)
        }
        Kind::Uid => {
            let (_, v) = parser::uid_payload(rest, lead.low).map_err(wrap_marker_err)?;
            Value::Uid(Uid::new(v))
        }
        Kind::Array => {
            let (_, refs) = parser::sequence_refs(rest, lead.low, ref_size).map_err(wrap_marker_err)?;
            let mut items = Vec::with_capacity(refs.len());
            for (index, r) in refs.into_iter().enumerate() {
                let child_offset = resolve_ref(r, table, path)?;
                let child_path = path.array_element(index);
                items.push(read_object(input, child_offset, table, ref_size, cache, active_sets, &child_path)?);
            }
            Value::Array(items)
        }
        Kind::Dict => {
            let (_, (key_refs, value_refs)) = parser::dict_refs(rest, lead.low, ref_size).map_err(wrap_marker_err)?;
            let mut dict = Dict::with_capacity(key_refs.len());
            for (index, (key_ref, value_ref)) in key_refs.into_iter().zip(value_refs).enumerate() {
                let key_offset = resolve_ref(key_ref, table, path)?;
                let key_path = path.dict_entry(format!("#{}", index));
                let key_value = read_object(input, key_offset, table, ref_size, cache, active_sets, &key_path)?;
                let key = match key_value {
                    Value::Str(s) => s,
                    _ => return Err(Error::new(ErrorKind::TypeMismatch, key_path).at_offset(key_offset)),
                };
                let value_offset = resolve_ref(value_ref, table, path)?;
                let value_path = path.dict_entry(key.clone());
                let value = read_object(input, value_offset, table, ref_size, cache, active_sets, &value_path)?;
                dict.insert(key, value);
            }
            Value::Dict(dict)
        }
        Kind::Set | Kind::OrderedSet => {
            if !active_sets.insert(offset) {
                return Err(Error::new(ErrorKind::CycleDetected, path.clone()).at_offset(offset));
            }
            let refs_result = parser::sequence_refs(rest, lead.low, ref_size).map_err(wrap_marker_err);
            let resolved = refs_result.and_then(|(_, refs)| {
                let mut items = Vec::with_capacity(refs.len());
                for (index, r) in refs.into_iter().enumerate() {
                    let child_offset = resolve_ref(r, table, path)?;
                    let child_path = path.set_element(index);
                    items.push(read_object(input, child_offset, table, ref_size, cache, active_sets, &child_path)?);
                }
                Ok(items)
            });
            active_sets.remove(&offset);
            resolved?;
            return Err(Error::new(ErrorKind::TypeMismatch, path.clone()).at_offset(offset));
        }
    };

    if value.is_scalar() {
        cache.insert(offset, value.clone());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer(num_objects: u8, top_object: u8, offset_table_offset: u8, offset_int_size: u8, object_ref_size: u8) -> Vec<u8> {
        let mut t = vec![0u8; marker::TRAILER_SIZE];
        t[6] = offset_int_size;
        t[7] = object_ref_size;
        t[8..16].copy_from_slice(&(num_objects as i64).to_be_bytes());
        t[16..24].copy_from_slice(&(top_object as i64).to_be_bytes());
        t[24..32].copy_from_slice(&(offset_table_offset as i64).to_be_bytes());
        t
    }

    #[test]
    fn test_decode_empty_dict_42_bytes() {
        let mut bytes = b"bplist00".to_vec();
        bytes.push(0xD0); // empty dict, 1 object
        bytes.push(0x08); // offset table: one entry, offset 8
        bytes.extend(trailer(1, 0, 9, 1, 1));
        assert_eq!(bytes.len(), 42);
        let value = decode(&bytes).unwrap();
        assert_eq!(value, Value::Dict(Dict::new()));
    }

    #[test]
    fn test_decode_single_bool_true_42_bytes() {
        let mut bytes = b"bplist00".to_vec();
        bytes.push(0x09);
        bytes.push(0x08);
        bytes.extend(trailer(1, 0, 9, 1, 1));
        assert_eq!(bytes.len(), 42);
        let value = decode(&bytes).unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn test_decode_dict_k_300() {
        let mut bytes = b"bplist00".to_vec();
        let dict_offset = bytes.len() as u8;
        // object 0: dict { 0 -> "k", 1 -> 300 } with one entry, refs width 1.
        bytes.push(0xD1);
        bytes.push(0x01); // key ref -> object 1
        bytes.push(0x02); // value ref -> object 2
        let key_offset = bytes.len() as u8;
        bytes.push(0x51);
        bytes.push(b'k');
        let int_offset = bytes.len() as u8;
        bytes.push(0x11);
        bytes.extend_from_slice(&300u16.to_be_bytes());
        let offset_table_offset = bytes.len() as u8;
        bytes.push(dict_offset);
        bytes.push(key_offset);
        bytes.push(int_offset);
        bytes.extend(trailer(3, 0, offset_table_offset, 1, 1));
        let value = decode(&bytes).unwrap();
        let mut expected = Dict::new();
        expected.insert("k", Value::Int(300));
        assert_eq!(value, Value::Dict(expected));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let bytes = b"notaplst".to_vec();
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_trailer_numobjects_256_refsize_1_fails() {
        let mut bytes = b"bplist00".to_vec();
        bytes.push(0xD0);
        bytes.push(0x08);
        bytes.extend(trailer(0, 0, 9, 1, 1)); // num_objects field overwritten below
        // Force num_objects = 256 with object_ref_size = 1: 2^8 = 256 is not > 256.
        let len = bytes.len();
        bytes[len - 24..len - 16].copy_from_slice(&256i64.to_be_bytes());
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedTrailer);
    }

    #[test]
    fn test_cycle_detected_for_self_referencing_set() {
        let mut bytes = b"bplist00".to_vec();
        let set_offset = bytes.len() as u8;
        // object 0: a Set with one element referencing itself (object 0).
        bytes.push(0xC1);
        bytes.push(0x00);
        let offset_table_offset = bytes.len() as u8;
        bytes.push(set_offset);
        bytes.extend(trailer(1, 0, offset_table_offset, 1, 1));
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CycleDetected);
    }

    #[test]
    fn test_acyclic_set_in_v00_is_type_mismatch() {
        let mut bytes = b"bplist00".to_vec();
        let set_offset = bytes.len() as u8;
        // object 0: a Set containing one true.
        bytes.push(0xC1);
        bytes.push(0x01);
        let true_offset = bytes.len() as u8;
        bytes.push(0x09); // object 1: true
        let offsets_offset = bytes.len() as u8;
        bytes.push(set_offset);
        bytes.push(true_offset);
        bytes.extend(trailer(2, 0, offsets_offset, 1, 1));
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }
}
