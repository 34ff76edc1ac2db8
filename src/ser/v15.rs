//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Binary plist encoder, dialect v15: a single recursive pass writes each object inline,
//! in place, with no object list and no offset table. The document length is backpatched
//! once the whole tree has been written; the CRC field is reserved but never checked on
//! read, so it is written as zero.

use log::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::marker;
use crate::path::Path;
use crate::primitive;
use crate::value::{UrlBase, Value};

use super::{emit_count, emit_string};

/// Encodes `value` as a v15 binary plist document.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let path = Path::root();

    let mut out = Vec::new();
    out.extend_from_slice(marker::HEADER_MAGIC_V15);

    out.push(0x13); // Int marker, width 8: the length field.
    let length_pos = out.len();
    out.extend([0u8; 8]);

    out.push(0x12); // Int marker, width 4: the CRC field, always written as zero.
    out.extend([0u8; 4]);

    emit_value(value, &mut out, &path)?;

    let total_len = out.len() as i64;
    out[length_pos..length_pos + 8].copy_from_slice(&total_len.to_be_bytes());
    trace!("v15 encode: {} total bytes", total_len);

    Ok(out)
}

fn emit_value(value: &Value, out: &mut Vec<u8>, path: &Path) -> Result<()> {
    match value {
        Value::Null => out.push(0x00),
        Value::Bool(false) => out.push(0x08),
        Value::Bool(true) => out.push(0x09),
        Value::Fill | Value::Uid(_) => return Err(Error::new(ErrorKind::EncodingRejected, path.clone())),
        Value::Int(v) => super::emit_int(*v as i128, out),
        Value::BigInt(v) => {
            out.push(0x14);
            out.extend(primitive::pack_be(*v, 16));
        }
        Value::Real32(v) => {
            out.push(0x22);
            out.extend(v.to_be_bytes());
        }
        Value::Real64(v) => {
            out.push(0x23);
            out.extend(v.to_be_bytes());
        }
        Value::Date(d) => {
            out.push(0x33);
            out.extend(d.absolute_time.to_be_bytes());
        }
        Value::Data(bytes) => {
            emit_count(0x40, bytes.len(), out);
            out.extend_from_slice(bytes);
        }
        Value::Str(s) => emit_string(s, out),
        Value::Uuid(u) => {
            out.push(0x0E);
            out.extend_from_slice(&u.bytes);
        }
        Value::Url { text, base } => match base {
            UrlBase::None => {
                out.push(0x0C);
                emit_value(&Value::Str(text.clone()), out, &path.array_element(0))?;
            }
            UrlBase::Base(b) => {
                out.push(0x0D);
                emit_value(&Value::Str(text.clone()), out, &path.array_element(0))?;
                emit_value(b, out, &path.array_element(1))?;
            }
        },
        Value::Array(items) => {
            emit_count(0xA0, items.len(), out);
            for (i, item) in items.iter().enumerate() {
                emit_value(item, out, &path.array_element(i))?;
            }
        }
        Value::Set(items) => {
            emit_count(0xC0, items.len(), out);
            for (i, item) in items.iter().enumerate() {
                emit_value(item, out, &path.set_element(i))?;
            }
        }
        Value::Dict(dict) => {
            emit_count(0xD0, dict.len(), out);
            for (key, _) in dict.iter() {
                emit_value(&Value::Str(key.clone()), out, &path.dict_entry(key.clone()))?;
            }
            for (key, v) in dict.iter() {
                emit_value(v, out, &path.dict_entry(key.clone()))?;
            }
        }
    }
    Ok(())
}
