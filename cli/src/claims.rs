use regex::Regex;
use transclaim::claim::{Claim, ClaimValue};
use transclaim::decoder::{Decoder, SubmoduleEntry};
use transclaim::tree::NestedToken;

use crate::error::{Error, Result};

/// Claims given on the command line as `LABEL:VALUE`.
///
/// VALUE is typed by its spelling: `true`/`false`, `null`, decimal
/// integers, decimal floats, `h'..'` hex bytes and `'..'` quoted text.
/// Anything else is taken as text. There are no submodules.
#[derive(Debug)]
pub(crate) struct ArgumentDecoder {
    claims: Vec<Claim>,
    next: usize,
}

struct Syntax {
    claim: Regex,
    integer: Regex,
    float: Regex,
}

impl Syntax {
    fn new() -> Result<Self> {
        let compile =
            |re: &str| Regex::new(re).map_err(|e| Error::InvalidInput(format!("claim syntax: {e}")));
        Ok(Syntax {
            claim: compile(r"(?s)^(-?\d+):(.*)$")?,
            integer: compile(r"^-?\d+$")?,
            float: compile(r"^-?(\d+\.\d*|\.\d+|\d+)([eE][+-]?\d+)?$")?,
        })
    }

    fn claim(&self, arg: &str) -> Result<Claim> {
        let captured = self
            .claim
            .captures(arg)
            .ok_or_else(|| Error::InvalidClaim(arg.to_string()))?;
        let label = captured[1]
            .parse()
            .map_err(|_| Error::InvalidClaim(arg.to_string()))?;
        let value = self.value(&captured[2], arg)?;
        Ok(Claim::new(label, value))
    }

    fn value(&self, raw: &str, arg: &str) -> Result<ClaimValue> {
        match raw {
            "true" => return Ok(ClaimValue::Bool(true)),
            "false" => return Ok(ClaimValue::Bool(false)),
            "null" => return Ok(ClaimValue::Null),
            _ => {}
        }
        if let Some(hex) = raw.strip_prefix("h'").and_then(|r| r.strip_suffix('\'')) {
            return decode_hex(hex)
                .map(ClaimValue::Bytes)
                .ok_or_else(|| Error::InvalidHex(arg.to_string()));
        }
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            return Ok(ClaimValue::Text(raw[1..raw.len() - 1].to_string()));
        }
        if self.integer.is_match(raw) {
            if let Ok(v) = raw.parse::<i64>() {
                return Ok(ClaimValue::Int64(v));
            }
            return raw
                .parse::<u64>()
                .map(ClaimValue::UInt64)
                .map_err(|_| Error::InvalidClaim(arg.to_string()));
        }
        if self.float.is_match(raw) {
            return raw
                .parse::<f64>()
                .map(ClaimValue::Double)
                .map_err(|_| Error::InvalidClaim(arg.to_string()));
        }
        Ok(ClaimValue::Text(raw.to_string()))
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

impl ArgumentDecoder {
    pub(crate) fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let syntax = Syntax::new()?;
        let claims = args
            .iter()
            .map(|arg| syntax.claim(arg.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(ArgumentDecoder { claims, next: 0 })
    }
}

impl Decoder for ArgumentDecoder {
    type Error = transclaim::Error;

    fn next_claim(&mut self) -> std::result::Result<Option<Claim>, Self::Error> {
        let claim = self.claims.get(self.next).cloned();
        if claim.is_some() {
            self.next += 1;
        }
        Ok(claim)
    }

    fn enter_submodule(&mut self, _index: usize) -> std::result::Result<SubmoduleEntry, Self::Error> {
        Ok(SubmoduleEntry::NoMore)
    }

    fn exit_submodule(&mut self) -> std::result::Result<(), Self::Error> {
        Err(transclaim::Error::Structure(
            "command line claims have no submodules".into(),
        ))
    }

    fn nested_token(&mut self, index: usize) -> std::result::Result<NestedToken, Self::Error> {
        Err(transclaim::Error::Structure(format!(
            "command line claims have no nested token at {index}"
        )))
    }

    fn rewind(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use transclaim::claim::{Claim, ClaimValue};
    use transclaim::decoder::{Decoder, SubmoduleEntry};

    use super::ArgumentDecoder;
    use crate::error::Error;

    #[rstest(arg, expected,
        case("1:5", Claim::int(1, 5)),
        case("-3:-5", Claim::int(-3, -5)),
        case("2:alice", Claim::text(2, "alice")),
        case("2:'42'", Claim::text(2, "42")),
        case("2:'a:b c'", Claim::text(2, "a:b c")),
        case("2:", Claim::text(2, "")),
        case("3:true", Claim::bool(3, true)),
        case("3:false", Claim::bool(3, false)),
        case("4:null", Claim::null(4)),
        case("5:1.5", Claim::double(5, 1.5)),
        case("5:-2e3", Claim::double(5, -2000.0)),
        case("6:h'dead'", Claim::bytes(6, vec![0xde, 0xad])),
        case("6:h''", Claim::bytes(6, vec![])),
        case("7:18446744073709551615", Claim::uint(7, u64::MAX)),
        case("7:9223372036854775807", Claim::int(7, i64::MAX)),
        case("8:1.2.3", Claim::text(8, "1.2.3")),
    )]
    fn test_parse_claim(arg: &str, expected: Claim) {
        let mut decoder = ArgumentDecoder::parse(&[arg]).unwrap();
        assert_eq!(Some(expected), decoder.next_claim().unwrap());
        assert_eq!(None, decoder.next_claim().unwrap());
    }

    #[rstest(arg, case("abc"), case("x:1"), case(":1"), case("99999999999999999999:1"))]
    fn test_parse_invalid_claim(arg: &str) {
        assert!(matches!(
            ArgumentDecoder::parse(&[arg]),
            Err(Error::InvalidClaim(_))
        ));
    }

    #[rstest(arg, case("6:h'abc'"), case("6:h'zz'"))]
    fn test_parse_invalid_hex(arg: &str) {
        assert!(matches!(
            ArgumentDecoder::parse(&[arg]),
            Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn test_integer_out_of_range() {
        assert!(ArgumentDecoder::parse(&["1:-9223372036854775809"]).is_err());
    }

    #[test]
    fn test_rewind_replays_claims() {
        let mut decoder = ArgumentDecoder::parse(&["1:5", "2:x"]).unwrap();
        let first: Vec<_> = std::iter::from_fn(|| decoder.next_claim().unwrap()).collect();
        assert_eq!(SubmoduleEntry::NoMore, decoder.enter_submodule(0).unwrap());
        decoder.rewind();
        let second: Vec<_> = std::iter::from_fn(|| decoder.next_claim().unwrap()).collect();
        assert_eq!(first, second);
        assert_eq!(ClaimValue::Int64(5), second[0].value);
        assert!(decoder.exit_submodule().is_err());
    }
}
