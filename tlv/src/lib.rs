//! Binary claim set in a DER-style tag/length/value layout.
//!
//! ```text
//! TOKEN     0x30 { CLAIM* SECTION? }
//! CLAIM     0xA0 { INTEGER label, value }
//! SECTION   0xA1 { (SUBMODULE | NESTED)* }
//! SUBMODULE 0xA2 { UTF8String name, TOKEN }
//! NESTED    0xA3 { UTF8String name, INTEGER kind, OCTET STRING token }
//! ```
//!
//! Lengths use the DER definite form. The encoder writes into one
//! contiguous buffer and back-patches lengths, so it needs the two-pass
//! render protocol.

use nom::{IResult, Parser};
use transclaim::processor::Transcoder;
use transclaim::render::render;
use transclaim::tree::{Module, TreeDecoder};

mod decode;
mod encode;
pub mod error;

pub use decode::TokenDecoder;
pub use encode::TokenEncoder;
pub use error::Error;

/// Deepest nesting of constructed elements the parser accepts.
pub const MAX_NESTING: usize = 64;

const TAG_CONSTRUCTED: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Tag {
    Boolean,
    Integer,
    OctetString,
    Null,
    Double,
    UTF8String,
    Token,
    Location,
    Unsigned,
    Claim,
    Section,
    Submodule,
    Nested,
    Unimplemented(u8),
}

impl From<u8> for Tag {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Tag::Boolean,
            0x02 => Tag::Integer,
            0x04 => Tag::OctetString,
            0x05 => Tag::Null,
            0x09 => Tag::Double,
            0x0c => Tag::UTF8String,
            0x30 => Tag::Token,
            0x31 => Tag::Location,
            0x42 => Tag::Unsigned,
            0xa0 => Tag::Claim,
            0xa1 => Tag::Section,
            0xa2 => Tag::Submodule,
            0xa3 => Tag::Nested,
            _ => Tag::Unimplemented(value),
        }
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> Self {
        match tag {
            Tag::Boolean => 0x01,
            Tag::Integer => 0x02,
            Tag::OctetString => 0x04,
            Tag::Null => 0x05,
            Tag::Double => 0x09,
            Tag::UTF8String => 0x0c,
            Tag::Token => 0x30,
            Tag::Location => 0x31,
            Tag::Unsigned => 0x42,
            Tag::Claim => 0xa0,
            Tag::Section => 0xa1,
            Tag::Submodule => 0xa2,
            Tag::Nested => 0xa3,
            Tag::Unimplemented(b) => b,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tlv {
    tag: Tag,
    value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Tlv(Vec<Tlv>),
    Data(Vec<u8>),
}

impl Tlv {
    pub(crate) fn tag(&self) -> Tag {
        self.tag
    }

    pub(crate) fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn parse(input: &[u8], depth: usize) -> Result<(&[u8], Tlv), Error> {
        let (input, (byte, data)) = parse_element(input)?;
        let tag = Tag::from(byte);

        if byte & TAG_CONSTRUCTED == TAG_CONSTRUCTED {
            if depth >= MAX_NESTING {
                return Err(Error::TooDeep(MAX_NESTING));
            }
            // parse TLV recursively.
            let mut tlvs = Vec::new();
            let mut data = data;
            while !data.is_empty() {
                let (rest, v) = Self::parse(data, depth + 1)?;
                data = rest;
                tlvs.push(v);
            }
            return Ok((
                input,
                Tlv {
                    tag,
                    value: Value::Tlv(tlvs),
                },
            ));
        }

        Ok((
            input,
            Tlv {
                tag,
                value: Value::Data(data.to_vec()),
            },
        ))
    }
}

fn parse_element(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, tag) = parse_tag(input)?;
    let (input, length) = parse_length(input)?;
    let (input, data) = nom::bytes::complete::take(length).parse(input)?;
    Ok((input, (tag, data)))
}

fn parse_tag(input: &[u8]) -> IResult<&[u8], u8> {
    nom::number::be_u8().parse(input)
}

fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, n) = nom::number::be_u8().parse(input)?;
    if n & 0x80 == 0x80 {
        // long form: the low 7 bits count the length bytes that follow.
        let count = (n & 0x7f) as usize;
        if count == 0 || count > 8 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::TooLarge,
            )));
        }
        let (rest, bs) = nom::bytes::complete::take(count).parse(input)?;
        let n = bs.iter().fold(0u64, |n, &b| (n << 8) | b as u64);
        let n = usize::try_from(n).map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::TooLarge))
        })?;
        return Ok((rest, n));
    }
    // short form: 0-127
    Ok((input, n as usize))
}

pub(crate) fn header(tag: Tag, len: usize) -> Vec<u8> {
    let mut out = vec![u8::from(tag)];
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out
}

pub(crate) fn element(tag: Tag, data: &[u8]) -> Vec<u8> {
    let mut out = header(tag, data.len());
    out.extend_from_slice(data);
    out
}

pub(crate) fn encode_i64(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 == 0x80);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

pub(crate) fn decode_i64(data: &[u8]) -> Result<i64, Error> {
    if data.is_empty() || data.len() > 8 {
        return Err(Error::InvalidValue("INTEGER"));
    }
    let mut buf = if data[0] & 0x80 == 0x80 { [0xff; 8] } else { [0x00; 8] };
    buf[8 - data.len()..].copy_from_slice(data);
    Ok(i64::from_be_bytes(buf))
}

pub(crate) fn encode_u64(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(bytes.len() - 1);
    bytes[skip..].to_vec()
}

pub(crate) fn decode_u64(data: &[u8]) -> Result<u64, Error> {
    if data.is_empty() || data.len() > 8 {
        return Err(Error::InvalidValue("UNSIGNED"));
    }
    Ok(data.iter().fold(0u64, |n, &b| (n << 8) | b as u64))
}

/// Encodes a whole module with the two-pass protocol.
pub fn to_bytes(module: &Module) -> Result<Vec<u8>, transclaim::Error> {
    render(
        &Transcoder::new(),
        &mut TreeDecoder::new(module),
        &mut TokenEncoder::new(),
    )
}
