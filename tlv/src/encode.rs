use std::mem;

use transclaim::buf::OutBuf;
use transclaim::claim::{Claim, ClaimValue, Location, Structured};
use transclaim::encoder::{Encoder, NestedTokenSink, SubmoduleHandle};
use transclaim::render::Render;
use transclaim::tree::NestedToken;
use transclaim::{Capability, Error};

use crate::{Tag, element, encode_i64, encode_u64, header};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    NotStarted,
    Open,
    Ended,
}

/// An element whose header is written once its body is complete.
#[derive(Debug)]
enum Frame {
    Token { start: usize, section: Section },
    Section { start: usize, entries: usize },
    Submodule { start: usize },
}

/// Writes a binary claim set.
///
/// Element lengths are only known once their bodies are written, so
/// headers are inserted in front of each body when it closes. The output
/// goes into one contiguous buffer sized by a measuring pass.
#[derive(Debug)]
pub struct TokenEncoder {
    out: OutBuf,
    frames: Vec<Frame>,
    submodules: usize,
}

impl Default for TokenEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEncoder {
    pub fn new() -> Self {
        TokenEncoder {
            out: OutBuf::measuring(),
            frames: Vec::new(),
            submodules: 0,
        }
    }

    fn close(&mut self, tag: Tag, start: usize) -> Result<(), Error> {
        let len = self.out.len() - start;
        self.out.insert(start, &header(tag, len))
    }

    fn section_entry(&mut self) -> Result<(), Error> {
        match self.frames.last_mut() {
            Some(Frame::Section { entries, .. }) => {
                *entries += 1;
                Ok(())
            }
            _ => Err(Error::Structure(
                "submodule entry outside of a submodules section".into(),
            )),
        }
    }
}

impl Encoder for TokenEncoder {
    type Error = Error;

    fn output_claim(&mut self, claim: &Claim) -> Result<(), Error> {
        match self.frames.last() {
            Some(Frame::Token {
                section: Section::NotStarted,
                ..
            }) => {}
            _ => {
                return Err(Error::Structure(format!(
                    "claim {} outside of a token body",
                    claim.label
                )));
            }
        }
        self.out.append(&encode_claim(claim)?)
    }

    fn start_submodules_section(&mut self) -> Result<(), Error> {
        match self.frames.last_mut() {
            Some(Frame::Token { section, .. }) if *section == Section::NotStarted => {
                *section = Section::Open;
            }
            _ => {
                return Err(Error::Structure(
                    "submodules section started twice or outside of a token".into(),
                ));
            }
        }
        self.frames.push(Frame::Section {
            start: self.out.len(),
            entries: 0,
        });
        Ok(())
    }

    fn end_submodules_section(&mut self) -> Result<(), Error> {
        let Some(Frame::Section { start, entries }) = self.frames.pop() else {
            return Err(Error::Structure("no submodules section to end".into()));
        };
        // an empty section is left out of the encoding
        if entries > 0 {
            self.close(Tag::Section, start)?;
        }
        match self.frames.last_mut() {
            Some(Frame::Token { section, .. }) if *section == Section::Open => {
                *section = Section::Ended;
                Ok(())
            }
            _ => Err(Error::Structure("submodules section outside of a token".into())),
        }
    }

    fn open_submodule(&mut self, name: &str) -> Result<SubmoduleHandle, Error> {
        self.section_entry()?;
        self.frames.push(Frame::Submodule {
            start: self.out.len(),
        });
        self.out.append(&element(Tag::UTF8String, name.as_bytes()))?;
        self.frames.push(Frame::Token {
            start: self.out.len(),
            section: Section::NotStarted,
        });
        self.submodules += 1;
        Ok(SubmoduleHandle::new(self.submodules))
    }

    fn close_submodule(&mut self, handle: SubmoduleHandle) -> Result<(), Error> {
        if handle.depth() != self.submodules || self.submodules == 0 {
            return Err(Error::Structure(format!(
                "closing submodule at depth {} while at depth {}",
                handle.depth(),
                self.submodules
            )));
        }
        let start = match self.frames.pop() {
            Some(Frame::Token { start, section }) if section != Section::Open => start,
            _ => return Err(Error::Structure("submodule closed with an open section".into())),
        };
        self.close(Tag::Token, start)?;
        let Some(Frame::Submodule { start }) = self.frames.pop() else {
            return Err(Error::Structure("submodule frame missing".into()));
        };
        self.close(Tag::Submodule, start)?;
        self.submodules -= 1;
        Ok(())
    }

    fn nested_tokens(&mut self) -> Option<&mut dyn NestedTokenSink<Error = Error>> {
        Some(self as &mut dyn NestedTokenSink<Error = Error>)
    }
}

impl NestedTokenSink for TokenEncoder {
    type Error = Error;

    fn output_nested_token(&mut self, token: &NestedToken) -> Result<(), Error> {
        self.section_entry()?;
        let mut body = element(Tag::UTF8String, token.name.as_bytes());
        body.extend(element(Tag::Integer, &encode_i64(i64::from(token.kind.code()))));
        body.extend(element(Tag::OctetString, &token.bytes));
        self.out.append(&element(Tag::Nested, &body))
    }
}

impl Render for TokenEncoder {
    fn start(&mut self, out: OutBuf) -> Result<(), Error> {
        self.out = out;
        self.frames = vec![Frame::Token {
            start: 0,
            section: Section::NotStarted,
        }];
        self.submodules = 0;
        Ok(())
    }

    fn finish(&mut self) -> Result<OutBuf, Error> {
        match self.frames.as_slice() {
            [Frame::Token { start: 0, section }] if *section != Section::Open => {}
            _ => return Err(Error::Structure("token finished with open elements".into())),
        }
        self.frames.clear();
        self.close(Tag::Token, 0)?;
        Ok(mem::replace(&mut self.out, OutBuf::measuring()))
    }
}

fn encode_claim(claim: &Claim) -> Result<Vec<u8>, Error> {
    if let ClaimValue::Structured(structured) = &claim.value {
        if structured.label() != claim.label {
            return Err(Error::Structure(format!(
                "{} value under label {}, expected label {}",
                structured.kind(),
                claim.label,
                structured.label()
            )));
        }
    }
    let mut body = element(Tag::Integer, &encode_i64(claim.label));
    body.extend(encode_value(&claim.value)?);
    Ok(element(Tag::Claim, &body))
}

fn encode_value(value: &ClaimValue) -> Result<Vec<u8>, Error> {
    let bytes = match value {
        ClaimValue::Int64(v) => element(Tag::Integer, &encode_i64(*v)),
        ClaimValue::UInt64(v) => element(Tag::Unsigned, &encode_u64(*v)),
        ClaimValue::Double(v) => element(Tag::Double, &v.to_be_bytes()),
        ClaimValue::Text(v) => element(Tag::UTF8String, v.as_bytes()),
        ClaimValue::Bytes(v) => element(Tag::OctetString, v),
        ClaimValue::Bool(v) => element(Tag::Boolean, &[if *v { 0xff } else { 0x00 }]),
        ClaimValue::Null => element(Tag::Null, &[]),
        ClaimValue::Structured(Structured::Location(location)) => encode_location(location)?,
        ClaimValue::Structured(_) => return Err(Error::Unsupported(Capability::StructuredValue)),
    };
    Ok(bytes)
}

fn encode_location(location: &Location) -> Result<Vec<u8>, Error> {
    let mut fields = vec![
        Claim::double(1, location.latitude),
        Claim::double(2, location.longitude),
    ];
    let optional = [
        (3, location.altitude),
        (4, location.accuracy),
        (5, location.altitude_accuracy),
        (6, location.heading),
        (7, location.speed),
    ];
    fields.extend(
        optional
            .into_iter()
            .filter_map(|(key, v)| v.map(|v| Claim::double(key, v))),
    );
    fields.extend(location.timestamp.map(|v| Claim::int(8, v)));
    fields.extend(location.age.map(|v| Claim::uint(9, v)));

    let mut body = Vec::new();
    for field in &fields {
        body.extend(encode_claim(field)?);
    }
    Ok(element(Tag::Location, &body))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use transclaim::claim::{Claim, ClaimValue, Location, Structured};
    use transclaim::encoder::Encoder;
    use transclaim::processor::Transcoder;
    use transclaim::render::{Render, render};
    use transclaim::tree::{Module, NestedToken, TokenKind, TreeDecoder, TreeEncoder};
    use transclaim::{Error, ErrorKind};

    use super::TokenEncoder;
    use crate::{TokenDecoder, to_bytes};

    fn decode(bytes: &[u8]) -> Module {
        let mut decoder = TokenDecoder::new(bytes).unwrap();
        let mut encoder = TreeEncoder::new();
        Transcoder::new().run(&mut decoder, &mut encoder).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_encode_flat_claims() {
        let module = Module::with_claims(vec![Claim::int(1, 5), Claim::text(2, "alice")]);
        let expected = vec![
            0x30, 0x14, 0xa0, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x05, 0xa0, 0x0a, 0x02, 0x01,
            0x02, 0x0c, 0x05, 0x61, 0x6c, 0x69, 0x63, 0x65,
        ];
        assert_eq!(expected, to_bytes(&module).unwrap());
    }

    #[test]
    fn test_encode_empty_token() {
        assert_eq!(vec![0x30, 0x00], to_bytes(&Module::new()).unwrap());
    }

    #[rstest(claim,
        case(Claim::bool(1, true)),
        case(Claim::null(2)),
        case(Claim::uint(3, u64::MAX)),
        case(Claim::int(4, i64::MIN)),
        case(Claim::double(5, -0.25)),
        case(Claim::bytes(6, vec![0u8; 300])),
        case(Claim::text(7, "x".repeat(200))),
        case(Claim::location(Location::new(35.6, 139.7))),
        case(Claim::location(Location { altitude: Some(40.0), timestamp: Some(-1), age: Some(7), ..Location::new(-1.0, 2.0) })),
    )]
    fn test_encode_decode_claim(claim: Claim) {
        let module = Module::with_claims(vec![claim]);
        assert_eq!(module, decode(&to_bytes(&module).unwrap()));
    }

    #[test]
    fn test_encode_location_under_wrong_label() {
        let location = ClaimValue::Structured(Structured::Location(Location::new(1.0, 2.0)));
        let module = Module::with_claims(vec![Claim::new(5, location)]);
        let err = to_bytes(&module).unwrap_err();
        assert_eq!(ErrorKind::Structural, err.kind());
    }

    #[test]
    fn test_encode_submodules_and_nested_tokens() {
        let mut inner = Module::with_claims(vec![Claim::bool(3, false)]);
        inner.push_token(NestedToken::new(TokenKind::Json, "attest", b"{}".to_vec()));
        let mut module = Module::with_claims(vec![Claim::int(1, 5)]);
        module.push_submodule("dev1", inner);
        module.push_submodule("empty", Module::new());
        module.push_token(NestedToken::new(TokenKind::Other(77), "vendor", vec![0xde, 0xad]));

        let bytes = to_bytes(&module).unwrap();
        assert_eq!(module, decode(&bytes));
    }

    #[test]
    fn test_encode_long_lengths() {
        let mut module = Module::new();
        for i in 0..40 {
            module.push_submodule(format!("sub{i}"), Module::with_claims(vec![Claim::int(i, i)]));
        }
        let bytes = to_bytes(&module).unwrap();
        // outer header switches to the long form
        assert_eq!(0x30, bytes[0]);
        assert_eq!(0x82, bytes[1]);
        assert_eq!(module, decode(&bytes));
    }

    #[test]
    fn test_encoder_rejects_misordered_calls() {
        let mut encoder = TokenEncoder::new();
        assert!(encoder.output_claim(&Claim::int(1, 1)).is_err());

        encoder.start(transclaim::buf::OutBuf::growable()).unwrap();
        encoder.start_submodules_section().unwrap();
        let err = encoder.output_claim(&Claim::int(1, 1)).unwrap_err();
        assert_eq!(ErrorKind::Structural, err.kind());
        assert!(encoder.finish().is_err());
    }

    #[test]
    fn test_measured_size_matches() {
        let mut module = Module::with_claims(vec![Claim::text(1, "a".repeat(130))]);
        module.push_submodule("s", Module::with_claims(vec![Claim::bytes(2, vec![1; 1000])]));
        let mut decoder = TreeDecoder::new(&module);
        let bytes = render(&Transcoder::new(), &mut decoder, &mut TokenEncoder::new()).unwrap();
        assert_eq!(module, decode(&bytes));
    }

    #[test]
    fn test_depth_limit_applies_to_decoded_tokens() {
        let mut module = Module::with_claims(vec![Claim::int(1, 1)]);
        for _ in 0..4 {
            let mut outer = Module::new();
            outer.push_submodule("n", module);
            module = outer;
        }
        let bytes = to_bytes(&module).unwrap();
        let mut decoder = TokenDecoder::new(&bytes).unwrap();
        let err = render(
            &Transcoder::new().max_depth(2),
            &mut decoder,
            &mut TokenEncoder::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DepthExceeded(2)));
    }

    fn arb_value() -> impl Strategy<Value = ClaimValue> {
        prop_oneof![
            any::<i64>().prop_map(ClaimValue::Int64),
            any::<u64>().prop_map(ClaimValue::UInt64),
            (-1e9f64..1e9).prop_map(ClaimValue::Double),
            ".{0,40}".prop_map(ClaimValue::Text),
            proptest::collection::vec(any::<u8>(), 0..200).prop_map(ClaimValue::Bytes),
            any::<bool>().prop_map(ClaimValue::Bool),
            Just(ClaimValue::Null),
        ]
    }

    fn arb_module() -> impl Strategy<Value = Module> {
        let leaf = proptest::collection::vec((0i64..1000, arb_value()), 0..6)
            .prop_map(|claims| Module::with_claims(claims.into_iter().map(|(l, v)| Claim::new(l, v)).collect()));
        leaf.prop_recursive(3, 24, 4, |inner| {
            (
                proptest::collection::vec((0i64..1000, arb_value()), 0..4),
                proptest::collection::vec(("[a-z]{1,8}", inner), 0..4),
            )
                .prop_map(|(claims, subs)| {
                    let mut module =
                        Module::with_claims(claims.into_iter().map(|(l, v)| Claim::new(l, v)).collect());
                    for (name, sub) in subs {
                        module.push_submodule(name, sub);
                    }
                    module
                })
        })
    }

    proptest! {
        #[test]
        fn prop_decode_reproduces_encoded_module(module in arb_module()) {
            let bytes = to_bytes(&module).unwrap();
            prop_assert_eq!(module, decode(&bytes));
        }
    }
}
