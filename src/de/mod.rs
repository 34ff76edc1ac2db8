//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Decoders for every dialect this crate understands, plus the dialect sniff used by the
//! top-level [`crate::decode`] entry point.

pub mod parser;
pub mod v00;
pub mod v15;

use log::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::marker;
use crate::path::Path;
use crate::value::Value;
use crate::xml;

/// The wire dialect a document was (or should be) encoded in.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Dialect {
    Xml,
    BinaryV00,
    BinaryV15,
}

/// Sniffs `input`'s dialect from its header bytes, without fully decoding it.
pub fn sniff(input: &[u8]) -> Result<Dialect> {
    if input.starts_with(marker::HEADER_MAGIC_V00) {
        Ok(Dialect::BinaryV00)
    } else if input.starts_with(marker::HEADER_MAGIC_V15) {
        Ok(Dialect::BinaryV15)
    } else if input.iter().take(64).any(|&b| b == b'<') {
        Ok(Dialect::Xml)
    } else {
        Err(Error::new(ErrorKind::MalformedHeader, Path::root()))
    }
}

/// Decodes `input`, sniffing its dialect first.
pub fn decode(input: &[u8]) -> Result<Value> {
    let dialect = sniff(input)?;
    debug!("sniffed dialect {:?}", dialect);
    match dialect {
        Dialect::Xml => xml::decode(input),
        Dialect::BinaryV00 => v00::decode(input),
        Dialect::BinaryV15 => v15::decode(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_v00() {
        assert_eq!(sniff(b"bplist00rest").unwrap(), Dialect::BinaryV00);
    }

    #[test]
    fn test_sniff_v15() {
        assert_eq!(sniff(b"bplist15rest").unwrap(), Dialect::BinaryV15);
    }

    #[test]
    fn test_sniff_xml() {
        assert_eq!(sniff(b"<?xml version=\"1.0\"?>").unwrap(), Dialect::Xml);
    }

    #[test]
    fn test_sniff_unknown() {
        assert!(sniff(b"not a plist at all").is_err());
    }
}
