//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Binary plist encoder, dialect v00: a flatten-and-unique pass over the value graph
//! produces an object list, then two further passes emit the object bodies and the
//! offset table that indexes them.

use std::collections::HashMap;

use log::trace;

use crate::error::{Error, ErrorKind, Result};
use crate::marker;
use crate::path::Path;
use crate::primitive;
use crate::value::Value;

use super::{emit_count, emit_string};

/// A value after flattening: scalars carry their own payload; containers carry only the
/// object-list indices of their children; the byte offsets those indices eventually
/// resolve to are not known until the emission pass below has sized every object.
enum FlatObject {
    Scalar(Value),
    Array(Vec<usize>),
    Dict(Vec<usize>, Vec<usize>),
}

impl FlatObject {
    fn remap_refs(&mut self, remap: impl Fn(usize) -> usize) {
        match self {
            FlatObject::Scalar(_) => {}
            FlatObject::Array(refs) => {
                for r in refs.iter_mut() {
                    *r = remap(*r);
                }
            }
            FlatObject::Dict(keys, values) => {
                for r in keys.iter_mut() {
                    *r = remap(*r);
                }
                for r in values.iter_mut() {
                    *r = remap(*r);
                }
            }
        }
    }
}

/// Encodes `value` as a v00 binary plist document.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let path = Path::root();

    let mut objlist = Vec::new();
    let mut unique = HashMap::new();
    flatten(value, &mut objlist, &mut unique, &path)?;
    let objlist = rotate_root_to_front(objlist);

    let num_objects = objlist.len() as u64;
    let object_ref_size = primitive::ref_bytes_count(num_objects);

    let mut body = Vec::new();
    let mut offsets = Vec::with_capacity(objlist.len());
    for obj in &objlist {
        offsets.push(marker::HEADER_SIZE + body.len());
        emit_object(obj, object_ref_size, &mut body);
    }

    let offset_table_offset = marker::HEADER_SIZE + body.len();
    let offset_int_size = primitive::ref_bytes_count(offset_table_offset as u64);

    trace!(
        "v00 encode: {} objects, objectRefSize {}, offsetIntSize {}",
        num_objects,
        object_ref_size,
        offset_int_size
    );

    let mut out = Vec::with_capacity(offset_table_offset + objlist.len() * offset_int_size + marker::TRAILER_SIZE);
    out.extend_from_slice(marker::HEADER_MAGIC_V00);
    out.extend_from_slice(&body);
    for offset in &offsets {
        out.extend(primitive::pack_be_u64(*offset as u64, offset_int_size));
    }

    out.extend(std::iter::repeat(0u8).take(marker::TRAILER_PREAMBLE_UNUSED_SIZE));
    out.push(0); // sortVersion: unused, always zero.
    out.push(offset_int_size as u8);
    out.push(object_ref_size as u8);
    out.extend((num_objects as i64).to_be_bytes());
    out.extend(0i64.to_be_bytes()); // topObject: the root is always rotated to index 0.
    out.extend((offset_table_offset as i64).to_be_bytes());

    Ok(out)
}

/// Appends `value`'s flattened form to `objlist`, deduplicating uniquable scalars, and
/// returns its index. Rejects variants with no v00 representation (§3.1, §4.3).
fn flatten(value: &Value, objlist: &mut Vec<FlatObject>, unique: &mut HashMap<Value, usize>, path: &Path) -> Result<usize> {
    if matches!(value, Value::Null | Value::Uuid(_) | Value::Url { .. } | Value::Set(_) | Value::Fill) {
        return Err(Error::new(ErrorKind::EncodingRejected, path.clone()));
    }

    if value.is_uniquable() {
        if let Some(&index) = unique.get(value) {
            return Ok(index);
        }
    }

    let index = match value {
        Value::Array(items) => {
            let mut refs = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                refs.push(flatten(item, objlist, unique, &path.array_element(i))?);
            }
            let index = objlist.len();
            objlist.push(FlatObject::Array(refs));
            index
        }
        Value::Dict(dict) => {
            let mut key_refs = Vec::with_capacity(dict.len());
            for (key, _) in dict.iter() {
                key_refs.push(flatten(&Value::Str(key.clone()), objlist, unique, &path.dict_entry(key.clone()))?);
            }
            let mut value_refs = Vec::with_capacity(dict.len());
            for (key, v) in dict.iter() {
                value_refs.push(flatten(v, objlist, unique, &path.dict_entry(key.clone()))?);
            }
            let index = objlist.len();
            objlist.push(FlatObject::Dict(key_refs, value_refs));
            index
        }
        scalar => {
            let index = objlist.len();
            objlist.push(FlatObject::Scalar(scalar.clone()));
            index
        }
    };

    if value.is_uniquable() {
        unique.insert(value.clone(), index);
    }
    Ok(index)
}

/// `flatten` always appends the top-level value last, since every child must be flattened
/// (and thus assigned its index) before its parent is. Rotating that final slot to the
/// front gives `topObject = 0` without a second allocation pass.
fn rotate_root_to_front(mut objlist: Vec<FlatObject>) -> Vec<FlatObject> {
    let n = objlist.len();
    if n <= 1 {
        return objlist;
    }
    let remap = |r: usize| (r + 1) % n;
    for obj in objlist.iter_mut() {
        obj.remap_refs(remap);
    }
    let root = objlist.pop().expect("n > 1");
    objlist.insert(0, root);
    objlist
}

fn emit_object(obj: &FlatObject, ref_size: usize, out: &mut Vec<u8>) {
    match obj {
        FlatObject::Scalar(value) => emit_scalar(value, out),
        FlatObject::Array(refs) => {
            emit_count(0xA0, refs.len(), out);
            for &r in refs {
                out.extend(primitive::pack_be_u64(r as u64, ref_size));
            }
        }
        FlatObject::Dict(keys, values) => {
            emit_count(0xD0, keys.len(), out);
            for &r in keys {
                out.extend(primitive::pack_be_u64(r as u64, ref_size));
            }
            for &r in values {
                out.extend(primitive::pack_be_u64(r as u64, ref_size));
            }
        }
    }
}

fn emit_scalar(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bool(false) => out.push(0x08),
        Value::Bool(true) => out.push(0x09),
        Value::Int(v) => super::emit_int(*v as i128, out),
        Value::BigInt(v) => {
            out.push(0x14);
            out.extend(primitive::pack_be(*v, 16));
        }
        Value::Uid(u) => {
            let width = primitive::ref_bytes_count(u.value);
            out.push(0x80 | (width as u8 - 1));
            out.extend(primitive::pack_be_u64(u.value, width));
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
        Value::Null | Value::Uuid(_) | Value::Url { .. } | Value::Fill => {
            unreachable!("rejected during flatten, never reaches emission")
        }
        Value::Array(_) | Value::Set(_) | Value::Dict(_) => {
            unreachable!("containers are emitted via FlatObject, not emit_scalar")
        }
    }
}
