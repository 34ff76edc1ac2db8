//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Big-endian integer/float packing and reference-epoch date arithmetic shared by both
//! binary dialects.

use chrono::{DateTime, NaiveDate, Utc};

/// The number of seconds since the Unix epoch at which the plist reference epoch,
/// 2001-01-01T00:00:00Z, falls. `NaiveDate` construction cannot fail for a fixed literal
/// date, so this is computed once as a `const fn`-friendly value at first use.
fn reference_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(
        NaiveDate::from_ymd_opt(2001, 1, 1)
            .expect("2001-01-01 is a valid calendar date")
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time of day"),
        Utc,
    )
}

/// Converts a UTC timestamp into seconds since the plist reference epoch.
pub fn date_to_secs(t: DateTime<Utc>) -> f64 {
    let delta = t - reference_epoch();
    delta.num_milliseconds() as f64 / 1000.0
}

/// Converts seconds since the plist reference epoch into a UTC timestamp.
pub fn secs_to_date(secs: f64) -> DateTime<Utc> {
    reference_epoch() + chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

/// The smallest power-of-two byte width in `{1, 2, 4, 8, 16}` whose unsigned
/// representation holds `|n|`. Negative values always require 8 bytes (signed
/// representation); magnitudes beyond a 64-bit unsigned range require 16.
pub fn bytes_count(n: i128) -> usize {
    if n < 0 {
        return 8;
    }
    let magnitude = n as u128;
    if magnitude <= 0xFF {
        1
    } else if magnitude <= 0xFFFF {
        2
    } else if magnitude <= 0xFFFF_FFFF {
        4
    } else if magnitude <= u64::MAX as u128 {
        8
    } else {
        16
    }
}

/// The smallest power-of-two byte width in `{1, 2, 4, 8}` whose unsigned representation
/// holds `n`. Used for reference/offset widths, which are never 16 bytes wide.
pub fn ref_bytes_count(n: u64) -> usize {
    if n <= 0xFF {
        1
    } else if n <= 0xFFFF {
        2
    } else if n <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

/// Packs `value` into `width` bytes, big-endian, right-justified, zero-extended.
/// `width` must be one of `{1, 2, 4, 8, 16}`.
pub fn pack_be(value: i128, width: usize) -> Vec<u8> {
    match width {
        1 => vec![value as u8],
        2 => (value as u16).to_be_bytes().to_vec(),
        4 => (value as u32).to_be_bytes().to_vec(),
        8 => (value as i64).to_be_bytes().to_vec(),
        16 => value.to_be_bytes().to_vec(),
        _ => panic!("unsupported pack width {}", width),
    }
}

/// Packs an unsigned reference/offset value into `width` bytes. `width` must be one of
/// `{1, 2, 4, 8}`.
pub fn pack_be_u64(value: u64, width: usize) -> Vec<u8> {
    match width {
        1 => vec![value as u8],
        2 => (value as u16).to_be_bytes().to_vec(),
        4 => (value as u32).to_be_bytes().to_vec(),
        8 => value.to_be_bytes().to_vec(),
        _ => panic!("unsupported reference width {}", width),
    }
}

/// The three shapes `read_be_int` can produce, mirroring the asymmetric signedness rule
/// of §4.1: widths 1/2/4 are unsigned and widened, width 8 is signed, width 16 is a
/// native signed 128-bit two's complement value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BeInt {
    Unsigned(u64),
    Signed(i64),
    Big(i128),
}

impl BeInt {
    /// Widens to `i128` regardless of the original width, for arithmetic that doesn't
    /// care about the distinction (e.g. reference/count validation).
    pub fn widen(self) -> i128 {
        match self {
            BeInt::Unsigned(v) => v as i128,
            BeInt::Signed(v) => v as i128,
            BeInt::Big(v) => v,
        }
    }
}

/// Reads a big-endian integer of the given width from `bytes`, which must be exactly
/// `width` bytes long. `width` must be one of `{1, 2, 4, 8, 16}`.
pub fn read_be_int(bytes: &[u8], width: usize) -> BeInt {
    match width {
        1 => BeInt::Unsigned(bytes[0] as u64),
        2 => BeInt::Unsigned(u16::from_be_bytes([bytes[0], bytes[1]]) as u64),
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[..4]);
            BeInt::Unsigned(u32::from_be_bytes(buf) as u64)
        }
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            BeInt::Signed(i64::from_be_bytes(buf))
        }
        16 => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&bytes[..16]);
            BeInt::Big(i128::from_be_bytes(buf))
        }
        _ => panic!("unsupported integer width {}", width),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_count_boundaries() {
        assert_eq!(bytes_count(0xFF), 1);
        assert_eq!(bytes_count(0x100), 2);
        assert_eq!(bytes_count(0xFFFF), 2);
        assert_eq!(bytes_count(0x10000), 4);
        assert_eq!(bytes_count(0xFFFF_FFFF), 4);
        assert_eq!(bytes_count(0x1_0000_0000), 8);
        assert_eq!(bytes_count(i64::MAX as i128), 8);
        assert_eq!(bytes_count(i64::MIN as i128), 8);
        assert_eq!(bytes_count(u64::MAX as i128 + 1), 16);
    }

    #[test]
    fn test_bytes_count_negative_always_eight() {
        assert_eq!(bytes_count(-1), 8);
        assert_eq!(bytes_count(-1_000_000_000_000), 8);
    }

    #[test]
    fn test_pack_and_read_round_trip_width_2() {
        let packed = pack_be(300, 2);
        assert_eq!(packed, vec![0x01, 0x2C]);
        assert_eq!(read_be_int(&packed, 2), BeInt::Unsigned(300));
    }

    #[test]
    fn test_pack_and_read_round_trip_width_8_negative() {
        let packed = pack_be(-1, 8);
        assert_eq!(packed, vec![0xFF; 8]);
        assert_eq!(read_be_int(&packed, 8), BeInt::Signed(-1));
    }

    #[test]
    fn test_pack_and_read_round_trip_width_16() {
        let packed = pack_be(i128::MIN, 16);
        assert_eq!(read_be_int(&packed, 16), BeInt::Big(i128::MIN));
    }

    #[test]
    fn test_date_round_trip() {
        let t = secs_to_date(0.0);
        assert_eq!(t.to_rfc3339(), "2001-01-01T00:00:00+00:00");
        assert_eq!(date_to_secs(t), 0.0);
    }

    #[test]
    fn test_date_negative_offset() {
        let t = secs_to_date(-86400.0);
        assert_eq!(date_to_secs(t), -86400.0);
    }
}
