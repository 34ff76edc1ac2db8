//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! `nom`-based marker/payload combinators shared by the v00 and v15 binary decoders.
//!
//! Every function here consumes from the slice immediately following a lead byte that the
//! caller has already classified with [`lead`]. Containers (Array/Set/Dict) are split into
//! a count and, depending on the dialect, either a list of reference indices (v00) or a
//! loop of recursive reads (v15) — the latter is driven by the caller, not this module.

use std::convert::TryFrom;

use ascii::AsciiStr;
use nom::bytes::complete::take;
use nom::combinator::{map, map_opt, map_res};
use nom::error::ErrorKind as NomErrorKind;
use nom::multi::count as nom_count;
use nom::number::complete::{be_f32, be_f64, be_u16};
use nom::{Err as NomErr, IResult};

use crate::marker::{self, Kind, Lead};
use crate::primitive::{self, BeInt};

pub type Input<'a> = &'a [u8];

fn fail<'a, T>(input: Input<'a>) -> IResult<Input<'a>, T> {
    Err(NomErr::Failure((input, NomErrorKind::Verify)))
}

/// Consumes and classifies one lead byte.
pub fn lead(input: Input) -> IResult<Input, Lead> {
    map_opt(take(1usize), |b: Input| marker::decode_lead_byte(b[0]))(input)
}

/// A decoded Real payload, tagged by width so the caller picks `Real32` or `Real64`.
#[derive(Copy, Clone, Debug)]
pub enum RealPayload {
    Single(f32),
    Double(f64),
}

/// Reads an Int payload of the given byte width.
pub fn int_payload(input: Input, width: usize) -> IResult<Input, BeInt> {
    map(take(width), move |bytes: Input| primitive::read_be_int(bytes, width))(input)
}

/// Reads a Real payload for a low nibble of `2` (32-bit) or `3` (64-bit).
pub fn real_payload(input: Input, low: u8) -> IResult<Input, RealPayload> {
    match marker::real_width(low) {
        4 => map(be_f32, RealPayload::Single)(input),
        8 => map(be_f64, RealPayload::Double)(input),
        _ => unreachable!("marker::real_width only yields 4 or 8"),
    }
}

/// Reads the fixed 8-byte Date payload (seconds since the reference epoch).
pub fn date_payload(input: Input) -> IResult<Input, f64> {
    be_f64(input)
}

/// Reads the 16-byte UUID payload.
pub fn uuid_payload(input: Input) -> IResult<Input, [u8; 16]> {
    map(take(16usize), |bytes: Input| {
        let mut out = [0u8; 16];
        out.copy_from_slice(bytes);
        out
    })(input)
}

/// Resolves a Data/String/container element count from the lead's low nibble: the nibble
/// directly when `< 0b1111`, or an embedded Int marker giving the real count otherwise.
pub fn payload_count(input: Input, low: u8) -> IResult<Input, usize> {
    if low != 0x0F {
        return Ok((input, low as usize));
    }
    let (input, extended) = lead(input)?;
    if extended.kind != Kind::Int {
        return fail(input);
    }
    let width = marker::int_width(extended.low);
    let (input, value) = int_payload(input, width)?;
    match usize::try_from(value.widen()) {
        Ok(count) => Ok((input, count)),
        Err(_) => fail(input),
    }
}

/// Reads a Data payload: `payload_count` bytes, verbatim.
pub fn data_payload(input: Input, low: u8) -> IResult<Input, &[u8]> {
    let (input, count) = payload_count(input, low)?;
    take(count)(input)
}

/// Reads an ASCII string payload.
pub fn ascii_string_payload(input: Input, low: u8) -> IResult<Input, &str> {
    let (input, bytes) = data_payload(input, low)?;
    match AsciiStr::from_ascii(bytes) {
        Ok(s) => Ok((input, s.as_str())),
        Err(_) => fail(input),
    }
}

/// Reads a UTF-16 (big-endian) string payload. `payload_count` here counts UTF-16 code
/// units, not bytes.
pub fn utf16_string_payload(input: Input, low: u8) -> IResult<Input, String> {
    let (input, unit_count) = payload_count(input, low)?;
    let (input, units) = nom_count(be_u16, unit_count)(input)?;
    match String::from_utf16(&units) {
        Ok(s) => Ok((input, s)),
        Err(_) => fail(input),
    }
}

/// Reads a UID payload (`low + 1` bytes, unsigned, widened to `u64`).
pub fn uid_payload(input: Input, low: u8) -> IResult<Input, u64> {
    let width = marker::uid_width(low);
    let (input, bytes) = take(width)(input)?;
    let mut buf = [0u8; 16];
    buf[16 - width..].copy_from_slice(bytes);
    match u64::try_from(u128::from_be_bytes(buf)) {
        Ok(value) => Ok((input, value)),
        Err(_) => fail(input),
    }
}

/// Reads `count` big-endian unsigned reference indices, each `ref_size` bytes wide.
pub fn refs(input: Input, count: usize, ref_size: usize) -> IResult<Input, Vec<usize>> {
    nom_count(
        map_res(take(ref_size), move |bytes: Input| {
            let mut buf = [0u8; 8];
            buf[8 - ref_size..].copy_from_slice(bytes);
            usize::try_from(u64::from_be_bytes(buf))
        }),
        count,
    )(input)
}

/// Reads an Array/Set reference list: a count from the lead's low nibble, then that many
/// `ref_size`-wide reference indices.
pub fn sequence_refs(input: Input, low: u8, ref_size: usize) -> IResult<Input, Vec<usize>> {
    let (input, count) = payload_count(input, low)?;
    refs(input, count, ref_size)
}

/// Reads a Dict reference list: a count, then that many key refs, then that many value
/// refs (keys enumerated before values, per §4.5).
pub fn dict_refs(input: Input, low: u8, ref_size: usize) -> IResult<Input, (Vec<usize>, Vec<usize>)> {
    let (input, count) = payload_count(input, low)?;
    let (input, keys) = refs(input, count, ref_size)?;
    let (input, values) = refs(input, count, ref_size)?;
    Ok((input, (keys, values)))
}
