//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! XML plist encoder and decoder (§4.8).
//!
//! The grammar this dialect actually uses is small and fixed — a dozen element names, no
//! attributes beyond `version`, and a handful of type-disambiguating comments — so reading
//! is implemented with a hand-written recursive-descent parser built on `nom`'s primitive
//! combinators, rather than a general-purpose XML crate. `UID`, `UUID`, `Float` and `Set`
//! have no native tag in this dialect; they ride as a `<!-- Name -->` comment immediately
//! before the tag the value would otherwise take.

use std::str;

use base64::engine::general_purpose;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use nom::bytes::complete::{tag, take_until};
use nom::sequence::delimited;
use nom::IResult;

use crate::error::{Error, ErrorKind, Result};
use crate::path::Path;
use crate::primitive;
use crate::value::{Date, Dict, Uid, Uuid, Value};

type Input<'a> = &'a str;

/// Encodes `value` as an XML plist document.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let path = Path::root();
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(
        "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    );
    out.push_str("<plist version=\"1.0\">\n");
    write_value(value, 1, &mut out, &path)?;
    out.push_str("</plist>\n");
    trace!("xml encode: {} bytes", out.len());
    Ok(out.into_bytes())
}

fn push_indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push('\t');
    }
}

fn write_value(value: &Value, level: usize, out: &mut String, path: &Path) -> Result<()> {
    push_indent(level, out);
    match value {
        Value::Bool(false) => out.push_str("<false/>\n"),
        Value::Bool(true) => out.push_str("<true/>\n"),
        Value::Int(v) => out.push_str(&format!("<integer>{}</integer>\n", v)),
        Value::BigInt(v) => out.push_str(&format!("<integer>{}</integer>\n", v)),
        Value::Real32(v) => out.push_str(&format!("<!-- Float --><real>{}</real>\n", format_real(*v as f64))),
        Value::Real64(v) => out.push_str(&format!("<real>{}</real>\n", format_real(*v))),
        Value::Date(d) => {
            let dt = primitive::secs_to_date(d.absolute_time);
            out.push_str(&format!("<date>{}</date>\n", dt.format("%Y-%m-%dT%H:%M:%SZ")));
        }
        Value::Data(bytes) => {
            out.push_str(&format!("<data>{}</data>\n", general_purpose::STANDARD.encode(bytes)));
        }
        Value::Str(s) => out.push_str(&format!("<string>{}</string>\n", escape_text(s))),
        Value::Uid(u) => out.push_str(&format!("<!-- UID --><string>0x{:X}</string>\n", u.value)),
        Value::Uuid(u) => out.push_str(&format!("<!-- UUID --><string>{}</string>\n", u.to_dashed_string())),
        Value::Array(items) => write_sequence(items, "array", None, level, out, path)?,
        Value::Set(items) => write_sequence(items, "array", Some("Set"), level, out, path)?,
        Value::Dict(dict) => {
            if dict.is_empty() {
                out.push_str("<dict/>\n");
            } else {
                out.push_str("<dict>\n");
                for (key, v) in dict.iter() {
                    push_indent(level + 1, out);
                    out.push_str(&format!("<key>{}</key>\n", escape_text(key)));
                    write_value(v, level + 1, out, &path.dict_entry(key.clone()))?;
                }
                push_indent(level, out);
                out.push_str("</dict>\n");
            }
        }
        Value::Null | Value::Url { .. } | Value::Fill => {
            return Err(Error::new(ErrorKind::EncodingRejected, path.clone()));
        }
    }
    Ok(())
}

fn write_sequence(items: &[Value], tag_name: &str, comment: Option<&str>, level: usize, out: &mut String, path: &Path) -> Result<()> {
    if let Some(name) = comment {
        out.push_str(&format!("<!-- {} -->", name));
    }
    if items.is_empty() {
        out.push_str(&format!("<{}/>\n", tag_name));
        return Ok(());
    }
    out.push_str(&format!("<{}>\n", tag_name));
    for (index, item) in items.iter().enumerate() {
        let child_path = if comment == Some("Set") { path.set_element(index) } else { path.array_element(index) };
        write_value(item, level + 1, out, &child_path)?;
    }
    push_indent(level, out);
    out.push_str(&format!("</{}>\n", tag_name));
    Ok(())
}

fn format_real(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format!("{}", v)
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn unescape_text(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Decodes an XML plist document into a [`Value`].
pub fn decode(input: &[u8]) -> Result<Value> {
    let path = Path::root();
    let text = str::from_utf8(input).map_err(|_| Error::message(path.clone(), "document is not valid UTF-8"))?;

    let rest = skip_prolog(text).ok_or_else(|| Error::new(ErrorKind::MalformedHeader, path.clone()))?;
    let rest = skip_ws(rest);
    let (rest, _) = open_tag(rest, "plist").map_err(|_| Error::new(ErrorKind::MalformedHeader, path.clone()))?;

    let (rest, value) = parse_value(rest, &path)?;
    debug!("xml decode: parsed top-level {}", value.kind_name());

    let rest = skip_ws(rest);
    close_tag(rest, "plist").map_err(|_| Error::new(ErrorKind::MalformedHeader, path))?;
    Ok(value)
}

fn skip_ws(input: Input) -> Input {
    input.trim_start()
}

fn skip_prolog(input: Input) -> Option<Input> {
    let mut rest = skip_ws(input);
    if rest.starts_with("<?xml") {
        let pos = rest.find("?>")?;
        rest = &rest[pos + 2..];
    }
    rest = skip_ws(rest);
    if rest.starts_with("<!DOCTYPE") {
        let pos = rest.find('>')?;
        rest = &rest[pos + 1..];
    }
    Some(rest)
}

fn comment(input: Input) -> IResult<Input, &str> {
    delimited(tag("<!--"), take_until("-->"), tag("-->"))(input)
}

/// Consumes whitespace and, if present, a single `<!-- Name -->` comment, returning its
/// trimmed text. Absence of a comment is not an error: most values have none.
fn leading_comment(input: Input) -> (Input, Option<String>) {
    let trimmed = skip_ws(input);
    match comment(trimmed) {
        Ok((rest, text)) => (skip_ws(rest), Some(text.trim().to_string())),
        Err(_) => (trimmed, None),
    }
}

fn peek_tag_name(input: Input) -> Option<&str> {
    let rest = input.strip_prefix('<')?;
    let end = rest.find(|c: char| c.is_whitespace() || c == '/' || c == '>')?;
    Some(&rest[..end])
}

fn open_tag<'a>(input: Input<'a>, name: &str) -> IResult<Input<'a>, ()> {
    let input = skip_ws(input);
    let (input, _) = tag(&*format!("<{}", name))(input)?;
    let (input, _) = take_until(">")(input)?;
    let (input, _) = tag(">")(input)?;
    Ok((input, ()))
}

fn close_tag<'a>(input: Input<'a>, name: &str) -> IResult<Input<'a>, ()> {
    let input = skip_ws(input);
    let (input, _) = tag(&*format!("</{}>", name))(input)?;
    Ok((input, ()))
}

/// Consumes `<name ...>` or `<name ... />`, returning whether it was self-closing.
fn open_or_self_close<'a>(input: Input<'a>, name: &str) -> IResult<Input<'a>, bool> {
    let input = skip_ws(input);
    let (input, _) = tag(&*format!("<{}", name))(input)?;
    let (input, attrs) = take_until(">")(input)?;
    let (input, _) = tag(">")(input)?;
    Ok((input, attrs.trim_end().ends_with('/')))
}

fn text_until_close<'a>(input: Input<'a>, name: &str) -> IResult<Input<'a>, &'a str> {
    let close = format!("</{}>", name);
    let (input, text) = take_until(&*close)(input)?;
    let (input, _) = tag(&*close)(input)?;
    Ok((input, text))
}

fn xml_err(path: &Path) -> Error {
    Error::message(path.clone(), "malformed XML element")
}

fn parse_integer_literal(text: &str, path: &Path) -> Result<Value> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude: i128 = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).map_err(|_| Error::new(ErrorKind::Overflow, path.clone()))?
    } else {
        digits.parse().map_err(|_| Error::new(ErrorKind::Overflow, path.clone()))?
    };
    let value = if negative { -magnitude } else { magnitude };
    if value >= i64::MIN as i128 && value <= i64::MAX as i128 {
        Ok(Value::Int(value as i64))
    } else {
        Ok(Value::BigInt(value))
    }
}

fn parse_real_literal(text: &str, path: &Path) -> Result<f64> {
    match text.to_ascii_lowercase().as_str() {
        "nan" => Ok(f64::NAN),
        "+infinity" | "inf" => Ok(f64::INFINITY),
        "-infinity" => Ok(f64::NEG_INFINITY),
        _ => text.parse().map_err(|_| Error::message(path.clone(), "malformed real literal")),
    }
}

fn parse_value<'a>(input: Input<'a>, path: &Path) -> Result<(Input<'a>, Value)> {
    let (input, comment_tag) = leading_comment(input);
    let name = peek_tag_name(input).ok_or_else(|| Error::message(path.clone(), "expected an element"))?.to_string();

    match name.as_str() {
        "true" => {
            let (input, _) = open_or_self_close(input, "true").map_err(|_| xml_err(path))?;
            Ok((input, Value::Bool(true)))
        }
        "false" => {
            let (input, _) = open_or_self_close(input, "false").map_err(|_| xml_err(path))?;
            Ok((input, Value::Bool(false)))
        }
        "integer" => {
            let (input, _) = open_tag(input, "integer").map_err(|_| xml_err(path))?;
            let (input, text) = text_until_close(input, "integer").map_err(|_| xml_err(path))?;
            Ok((input, parse_integer_literal(text.trim(), path)?))
        }
        "real" => {
            let (input, _) = open_tag(input, "real").map_err(|_| xml_err(path))?;
            let (input, text) = text_until_close(input, "real").map_err(|_| xml_err(path))?;
            let v = parse_real_literal(text.trim(), path)?;
            let value = if comment_tag.as_deref() == Some("Float") { Value::Real32(v as f32) } else { Value::Real64(v) };
            Ok((input, value))
        }
        "date" => {
            let (input, _) = open_tag(input, "date").map_err(|_| xml_err(path))?;
            let (input, text) = text_until_close(input, "date").map_err(|_| xml_err(path))?;
            let dt = DateTime::parse_from_rfc3339(text.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| Error::message(path.clone(), "malformed date literal"))?;
            Ok((input, Value::Date(Date::from_absolute_time(primitive::date_to_secs(dt)))))
        }
        "data" => {
            let (input, _) = open_tag(input, "data").map_err(|_| xml_err(path))?;
            let (input, text) = text_until_close(input, "data").map_err(|_| xml_err(path))?;
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = general_purpose::STANDARD.decode(&cleaned).map_err(|_| Error::new(ErrorKind::MalformedMarker, path.clone()))?;
            Ok((input, Value::Data(bytes)))
        }
        "string" => {
            let (input, _) = open_tag(input, "string").map_err(|_| xml_err(path))?;
            let (input, text) = text_until_close(input, "string").map_err(|_| xml_err(path))?;
            let text = unescape_text(text);
            let value = match comment_tag.as_deref() {
                Some("UID") => {
                    let hex = text.trim().trim_start_matches("0x").trim_start_matches("0X");
                    let v = u64::from_str_radix(hex, 16).map_err(|_| Error::new(ErrorKind::TypeMismatch, path.clone()))?;
                    Value::Uid(Uid::new(v))
                }
                Some("UUID") => {
                    let u = Uuid::from_dashed_string(text.trim()).ok_or_else(|| Error::new(ErrorKind::TypeMismatch, path.clone()))?;
                    Value::Uuid(u)
                }
                _ => Value::Str(text),
            };
            Ok((input, value))
        }
        "array" => {
            let (input, self_closed) = open_or_self_close(input, "array").map_err(|_| xml_err(path))?;
            let is_set = comment_tag.as_deref() == Some("Set");
            if self_closed {
                return Ok((input, if is_set { Value::Set(Vec::new()) } else { Value::Array(Vec::new()) }));
            }
            let mut items = Vec::new();
            let mut rest = input;
            loop {
                let peeked = skip_ws(rest);
                if peeked.starts_with("</array>") {
                    rest = peeked;
                    break;
                }
                let child_path = if is_set { path.set_element(items.len()) } else { path.array_element(items.len()) };
                let (next, value) = parse_value(peeked, &child_path)?;
                items.push(value);
                rest = next;
            }
            let (input, _) = close_tag(rest, "array").map_err(|_| xml_err(path))?;
            Ok((input, if is_set { Value::Set(items) } else { Value::Array(items) }))
        }
        "dict" => {
            let (input, self_closed) = open_or_self_close(input, "dict").map_err(|_| xml_err(path))?;
            if self_closed {
                return Ok((input, Value::Dict(Dict::new())));
            }
            let mut dict = Dict::new();
            let mut rest = input;
            loop {
                let peeked = skip_ws(rest);
                if peeked.starts_with("</dict>") {
                    rest = peeked;
                    break;
                }
                let (next, _) = open_tag(peeked, "key").map_err(|_| xml_err(path))?;
                let (next, key_text) = text_until_close(next, "key").map_err(|_| xml_err(path))?;
                let key = unescape_text(key_text);
                let child_path = path.dict_entry(key.clone());
                let (next, value) = parse_value(next, &child_path)?;
                dict.insert(key, value);
                rest = next;
            }
            let (input, _) = close_tag(rest, "dict").map_err(|_| xml_err(path))?;
            Ok((input, Value::Dict(dict)))
        }
        other => Err(Error::message(path.clone(), format!("unsupported element <{}>", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_empty_dict() {
        let value = Value::Dict(Dict::new());
        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_decode_dict_k_300() {
        let mut dict = Dict::new();
        dict.insert("k", Value::Int(300));
        let value = Value::Dict(dict);
        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_decode_unicode_string() {
        let value = Value::Str("αβ".to_string());
        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_decode_uid_comment_convention() {
        let value = Value::Uid(Uid::new(0x2A));
        let bytes = encode(&value).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("<!-- UID -->"));
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_decode_uuid_comment_convention() {
        let value = Value::Uuid(Uuid::new([0xAB; 16]));
        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_decode_float_comment_convention() {
        let value = Value::Real32(1.5);
        let bytes = encode(&value).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("<!-- Float -->"));
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_decode_set_comment_convention() {
        let value = Value::Set(vec![Value::Bool(true)]);
        let bytes = encode(&value).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("<!-- Set -->"));
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_encode_rejects_null() {
        let err = encode(&Value::Null).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EncodingRejected);
    }

    #[test]
    fn test_decode_data_element() {
        let bytes = b"<?xml version=\"1.0\"?><plist version=\"1.0\"><data>aGk=</data></plist>";
        assert_eq!(decode(bytes).unwrap(), Value::Data(b"hi".to_vec()));
    }

    #[test]
    fn test_decode_nan_real() {
        let bytes = b"<?xml version=\"1.0\"?><plist version=\"1.0\"><real>nan</real></plist>";
        match decode(bytes).unwrap() {
            Value::Real64(v) => assert!(v.is_nan()),
            other => panic!("expected Real64, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_hex_integer() {
        let bytes = b"<?xml version=\"1.0\"?><plist version=\"1.0\"><integer>0x1A</integer></plist>";
        assert_eq!(decode(bytes).unwrap(), Value::Int(26));
    }
}
