use tracing::debug;
use transclaim::claim::{Claim, ClaimValue, LOCATION_LABEL, Label, Location, Structured};
use transclaim::decoder::{Decoder, SubmoduleEntry};
use transclaim::tree::{Entry, Module, NestedToken, TokenKind, TreeDecoder};

use crate::error::Error;
use crate::{Tag, Tlv, Value, decode_i64, decode_u64};

/// Reads a binary claim set.
///
/// The whole token is parsed and validated on construction, so a
/// transcoding run never fails half way through on malformed input.
#[derive(Debug)]
pub struct TokenDecoder {
    tree: TreeDecoder<Module>,
}

impl TokenDecoder {
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::Empty);
        }
        let (rest, tlv) = Tlv::parse(bytes, 0)?;
        if !rest.is_empty() {
            return Err(Error::TrailingBytes(rest.len()));
        }
        let module = module(&tlv)?;
        debug!(
            claims = module.claims.len(),
            entries = module.entries.len(),
            depth = module.depth(),
            "claim set validated"
        );
        Ok(TokenDecoder {
            tree: TreeDecoder::new(module),
        })
    }

    pub fn module(&self) -> &Module {
        self.tree.module()
    }

    pub fn into_module(self) -> Module {
        self.tree.into_inner()
    }
}

impl Decoder for TokenDecoder {
    type Error = transclaim::Error;

    fn next_claim(&mut self) -> Result<Option<Claim>, Self::Error> {
        self.tree.next_claim()
    }

    fn enter_submodule(&mut self, index: usize) -> Result<SubmoduleEntry, Self::Error> {
        self.tree.enter_submodule(index)
    }

    fn exit_submodule(&mut self) -> Result<(), Self::Error> {
        self.tree.exit_submodule()
    }

    fn nested_token(&mut self, index: usize) -> Result<NestedToken, Self::Error> {
        self.tree.nested_token(index)
    }

    fn rewind(&mut self) {
        self.tree.rewind()
    }
}

fn children<'a>(tlv: &'a Tlv, expected: Tag, context: &'static str) -> Result<&'a [Tlv], Error> {
    match tlv.value() {
        Value::Tlv(children) if tlv.tag() == expected => Ok(children),
        _ => Err(Error::UnexpectedTag {
            found: tlv.tag().into(),
            context,
        }),
    }
}

fn data<'a>(tlv: &'a Tlv, expected: Tag, context: &'static str) -> Result<&'a [u8], Error> {
    match tlv.value() {
        Value::Data(data) if tlv.tag() == expected => Ok(data),
        _ => Err(Error::UnexpectedTag {
            found: tlv.tag().into(),
            context,
        }),
    }
}

fn text(tlv: &Tlv, context: &'static str) -> Result<String, Error> {
    let bytes = data(tlv, Tag::UTF8String, context)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidValue("UTF8String"))
}

fn module(tlv: &Tlv) -> Result<Module, Error> {
    let mut module = Module::new();
    let mut section_seen = false;
    for child in children(tlv, Tag::Token, "token")? {
        match child.tag() {
            Tag::Claim if !section_seen => module.claims.push(claim(child)?),
            Tag::Section if !section_seen => {
                section_seen = true;
                for entry in children(child, Tag::Section, "submodules section")? {
                    module.entries.push(self::entry(entry)?);
                }
            }
            other => {
                return Err(Error::UnexpectedTag {
                    found: other.into(),
                    context: "token body",
                });
            }
        }
    }
    Ok(module)
}

fn entry(tlv: &Tlv) -> Result<Entry, Error> {
    match tlv.tag() {
        Tag::Submodule => match children(tlv, Tag::Submodule, "submodule")? {
            [name, token] => Ok(Entry::Submodule {
                name: text(name, "submodule name")?,
                module: module(token)?,
            }),
            _ => Err(Error::InvalidValue("submodule")),
        },
        Tag::Nested => match children(tlv, Tag::Nested, "nested token")? {
            [name, kind, bytes] => {
                let kind = decode_i64(data(kind, Tag::Integer, "nested token kind")?)?;
                let kind = u32::try_from(kind).map_err(|_| Error::InvalidValue("nested token kind"))?;
                Ok(Entry::Token(NestedToken::new(
                    TokenKind::from(kind),
                    text(name, "nested token name")?,
                    data(bytes, Tag::OctetString, "nested token")?,
                )))
            }
            _ => Err(Error::InvalidValue("nested token")),
        },
        other => Err(Error::UnexpectedTag {
            found: other.into(),
            context: "submodules section",
        }),
    }
}

fn claim(tlv: &Tlv) -> Result<Claim, Error> {
    match children(tlv, Tag::Claim, "claim")? {
        [label, value] => {
            let label = decode_i64(data(label, Tag::Integer, "claim label")?)?;
            Ok(Claim::new(label, self::value(label, value)?))
        }
        _ => Err(Error::InvalidValue("claim")),
    }
}

fn value(label: Label, tlv: &Tlv) -> Result<ClaimValue, Error> {
    if tlv.tag() == Tag::Location {
        if label != LOCATION_LABEL {
            return Err(Error::UnexpectedStructured(label));
        }
        let location = location(children(tlv, Tag::Location, "location")?)?;
        return Ok(ClaimValue::Structured(Structured::Location(location)));
    }

    let bytes = match tlv.value() {
        Value::Data(bytes) => bytes.as_slice(),
        Value::Tlv(_) => {
            return Err(Error::UnexpectedTag {
                found: tlv.tag().into(),
                context: "claim value",
            });
        }
    };
    match tlv.tag() {
        Tag::Boolean => match bytes {
            [0x00] => Ok(ClaimValue::Bool(false)),
            [0xff] => Ok(ClaimValue::Bool(true)),
            _ => Err(Error::InvalidValue("BOOLEAN")),
        },
        Tag::Integer => Ok(ClaimValue::Int64(decode_i64(bytes)?)),
        Tag::Unsigned => Ok(ClaimValue::UInt64(decode_u64(bytes)?)),
        Tag::Double => {
            let bytes: [u8; 8] = bytes.try_into().map_err(|_| Error::InvalidValue("DOUBLE"))?;
            Ok(ClaimValue::Double(f64::from_be_bytes(bytes)))
        }
        Tag::UTF8String => String::from_utf8(bytes.to_vec())
            .map(ClaimValue::Text)
            .map_err(|_| Error::InvalidValue("UTF8String")),
        Tag::OctetString => Ok(ClaimValue::Bytes(bytes.to_vec())),
        Tag::Null if bytes.is_empty() => Ok(ClaimValue::Null),
        Tag::Null => Err(Error::InvalidValue("NULL")),
        other => Err(Error::UnexpectedTag {
            found: other.into(),
            context: "claim value",
        }),
    }
}

fn location(fields: &[Tlv]) -> Result<Location, Error> {
    let mut location = Location::default();
    let mut seen = 0u16;
    for field in fields {
        let Claim { label, value } = claim(field)?;
        let bit = u32::try_from(label)
            .ok()
            .filter(|key| (1..=9).contains(key))
            .map(|key| 1u16 << key)
            .ok_or(Error::InvalidValue("location field"))?;
        if seen & bit != 0 {
            return Err(Error::InvalidValue("duplicate location field"));
        }
        seen |= bit;
        match (label, value) {
            (1, ClaimValue::Double(v)) => location.latitude = v,
            (2, ClaimValue::Double(v)) => location.longitude = v,
            (3, ClaimValue::Double(v)) => location.altitude = Some(v),
            (4, ClaimValue::Double(v)) => location.accuracy = Some(v),
            (5, ClaimValue::Double(v)) => location.altitude_accuracy = Some(v),
            (6, ClaimValue::Double(v)) => location.heading = Some(v),
            (7, ClaimValue::Double(v)) => location.speed = Some(v),
            (8, ClaimValue::Int64(v)) => location.timestamp = Some(v),
            (9, ClaimValue::UInt64(v)) => location.age = Some(v),
            _ => return Err(Error::InvalidValue("location field")),
        }
    }
    // latitude and longitude are mandatory
    if seen & 0b110 != 0b110 {
        return Err(Error::InvalidValue("location without latitude and longitude"));
    }
    Ok(location)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use transclaim::claim::{Claim, ClaimValue};
    use transclaim::decoder::{Decoder, SubmoduleEntry};

    use super::TokenDecoder;
    use crate::error::Error;

    const FLAT: [u8; 22] = [
        0x30, 0x14, 0xa0, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x05, 0xa0, 0x0a, 0x02, 0x01, 0x02,
        0x0c, 0x05, 0x61, 0x6c, 0x69, 0x63, 0x65,
    ];

    #[test]
    fn test_decode_flat_claims() {
        let mut decoder = TokenDecoder::new(&FLAT).unwrap();
        assert_eq!(Some(Claim::int(1, 5)), decoder.next_claim().unwrap());
        assert_eq!(Some(Claim::text(2, "alice")), decoder.next_claim().unwrap());
        assert_eq!(None, decoder.next_claim().unwrap());
        assert_eq!(SubmoduleEntry::NoMore, decoder.enter_submodule(0).unwrap());
    }

    #[rstest(input, expected,
        case(vec![0x01, 0x01, 0xff], ClaimValue::Bool(true)),
        case(vec![0x01, 0x01, 0x00], ClaimValue::Bool(false)),
        case(vec![0x05, 0x00], ClaimValue::Null),
        case(vec![0x02, 0x01, 0xff], ClaimValue::Int64(-1)),
        case(vec![0x42, 0x02, 0x01, 0x00], ClaimValue::UInt64(256)),
        case(vec![0x04, 0x02, 0xde, 0xad], ClaimValue::Bytes(vec![0xde, 0xad])),
        case(vec![0x09, 0x08, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0], ClaimValue::Double(1.5)),
    )]
    fn test_decode_value(input: Vec<u8>, expected: ClaimValue) {
        let mut claim = vec![0xa0, (input.len() + 3) as u8, 0x02, 0x01, 0x07];
        claim.extend(input);
        let mut token = vec![0x30, claim.len() as u8];
        token.extend(claim);

        let mut decoder = TokenDecoder::new(&token).unwrap();
        assert_eq!(Some(Claim::new(7, expected)), decoder.next_claim().unwrap());
    }

    #[rstest(input,
        // not a token
        case(vec![0x02, 0x01, 0x00]),
        // boolean with a bad payload
        case(vec![0x30, 0x08, 0xa0, 0x06, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01]),
        // claim after the submodules section
        case(vec![0x30, 0x0a, 0xa1, 0x00, 0xa0, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x05]),
        // claim with a missing value
        case(vec![0x30, 0x05, 0xa0, 0x03, 0x02, 0x01, 0x01]),
        // location under a label that carries no location
        case(vec![0x30, 0x07, 0xa0, 0x05, 0x02, 0x01, 0x01, 0x31, 0x00]),
        // submodule whose body is not a token
        case(vec![0x30, 0x0a, 0xa1, 0x08, 0xa2, 0x06, 0x0c, 0x01, 0x61, 0x02, 0x01, 0x00]),
    )]
    fn test_decode_invalid(input: Vec<u8>) {
        assert!(TokenDecoder::new(&input).is_err());
    }

    #[test]
    fn test_decode_truncated() {
        let err = TokenDecoder::new(&FLAT[..FLAT.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Parser(_) | Error::ParserIncomplete(_)));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut input = FLAT.to_vec();
        input.push(0x00);
        assert!(matches!(TokenDecoder::new(&input), Err(Error::TrailingBytes(1))));
    }

    #[test]
    fn test_decode_empty() {
        assert!(matches!(TokenDecoder::new(&[]), Err(Error::Empty)));
    }

    #[test]
    fn test_decode_submodule() {
        // { 1: 5, submods: { dev1: { 3: false } } }
        let input = vec![
            0x30, 0x1c, 0xa0, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x05, 0xa1, 0x12, 0xa2, 0x10,
            0x0c, 0x04, 0x64, 0x65, 0x76, 0x31, 0x30, 0x08, 0xa0, 0x06, 0x02, 0x01, 0x03, 0x01,
            0x01, 0x00,
        ];
        let mut decoder = TokenDecoder::new(&input).unwrap();
        assert_eq!(Some(Claim::int(1, 5)), decoder.next_claim().unwrap());
        assert_eq!(None, decoder.next_claim().unwrap());
        assert_eq!(
            SubmoduleEntry::Entered("dev1".to_string()),
            decoder.enter_submodule(0).unwrap()
        );
        assert_eq!(Some(Claim::bool(3, false)), decoder.next_claim().unwrap());
        decoder.exit_submodule().unwrap();
        assert_eq!(SubmoduleEntry::NoMore, decoder.enter_submodule(1).unwrap());
    }
}
