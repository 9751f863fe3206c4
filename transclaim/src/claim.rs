//! The claim value model exchanged between decoders and encoders.
//!
//! A [`Claim`] is one labeled value. The label is an opaque integer that is
//! only meaningful to format collaborators. The value is either one of the
//! primitive kinds every format understands, or a [`Structured`] payload
//! whose schema is selected by the label.
//!
//! Any label that a collaborator does not recognize is still carried
//! through its primitive value, so new labels never break existing formats.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Integer claim key.
pub type Label = i64;

/// Label of the location claim, the one structured payload currently known.
pub const LOCATION_LABEL: Label = 264;

/// One labeled unit of data within a token.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub label: Label,
    pub value: ClaimValue,
}

impl Claim {
    pub fn new(label: Label, value: ClaimValue) -> Self {
        Claim { label, value }
    }

    pub fn int(label: Label, value: i64) -> Self {
        Claim::new(label, ClaimValue::Int64(value))
    }

    pub fn uint(label: Label, value: u64) -> Self {
        Claim::new(label, ClaimValue::UInt64(value))
    }

    pub fn double(label: Label, value: f64) -> Self {
        Claim::new(label, ClaimValue::Double(value))
    }

    pub fn text(label: Label, value: impl Into<String>) -> Self {
        Claim::new(label, ClaimValue::Text(value.into()))
    }

    pub fn bytes(label: Label, value: impl Into<Vec<u8>>) -> Self {
        Claim::new(label, ClaimValue::Bytes(value.into()))
    }

    pub fn bool(label: Label, value: bool) -> Self {
        Claim::new(label, ClaimValue::Bool(value))
    }

    pub fn null(label: Label) -> Self {
        Claim::new(label, ClaimValue::Null)
    }

    /// Builds a location claim under [`LOCATION_LABEL`].
    pub fn location(location: Location) -> Self {
        Claim::new(
            LOCATION_LABEL,
            ClaimValue::Structured(Structured::Location(location)),
        )
    }
}

impl Display for Claim {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label, self.value)
    }
}

/// The value carried by a claim.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Null,
    Structured(Structured),
}

impl ClaimValue {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimValue::Int64(_) => "int64",
            ClaimValue::UInt64(_) => "uint64",
            ClaimValue::Double(_) => "double",
            ClaimValue::Text(_) => "text",
            ClaimValue::Bytes(_) => "bytes",
            ClaimValue::Bool(_) => "bool",
            ClaimValue::Null => "null",
            ClaimValue::Structured(s) => s.kind(),
        }
    }
}

impl Display for ClaimValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimValue::Int64(v) => write!(f, "{v}"),
            ClaimValue::UInt64(v) => write!(f, "{v}"),
            ClaimValue::Double(v) => write!(f, "{v}"),
            ClaimValue::Text(v) => write!(f, "{v:?}"),
            ClaimValue::Bytes(v) => {
                write!(f, "h'")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                write!(f, "'")
            }
            ClaimValue::Bool(v) => write!(f, "{v}"),
            ClaimValue::Null => write!(f, "null"),
            ClaimValue::Structured(Structured::Location(loc)) => {
                write!(f, "location({}, {})", loc.latitude, loc.longitude)
            }
        }
    }
}

/// Rich claim payloads whose schema is keyed by the claim label.
///
/// New kinds may be added; formats must fall back to an error (or to the
/// label's primitive representation) for kinds they do not handle.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Structured {
    Location(Location),
}

impl Structured {
    /// The label this payload belongs under.
    pub fn label(&self) -> Label {
        match self {
            Structured::Location(_) => LOCATION_LABEL,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Structured::Location(_) => "location",
        }
    }
}

/// Geographic location of the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Seconds since the epoch at which the location was measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Seconds elapsed since the measurement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u64>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Location {
            latitude,
            longitude,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Claim, ClaimValue, LOCATION_LABEL, Location, Structured};

    #[rstest(
        claim,
        expected,
        case(Claim::int(1, -5), "1: -5"),
        case(Claim::uint(2, u64::MAX), "2: 18446744073709551615"),
        case(Claim::text(3, "alice"), r#"3: "alice""#),
        case(Claim::bytes(4, vec![0xde, 0xad]), "4: h'dead'"),
        case(Claim::bool(5, true), "5: true"),
        case(Claim::null(6), "6: null"),
        case(Claim::location(Location::new(1.5, -2.0)), "264: location(1.5, -2)")
    )]
    fn test_claim_display(claim: Claim, expected: &str) {
        assert_eq!(expected, claim.to_string());
    }

    #[test]
    fn test_location_claim_is_keyed_by_label() {
        let claim = Claim::location(Location::new(0.0, 0.0));
        assert_eq!(LOCATION_LABEL, claim.label);
        match claim.value {
            ClaimValue::Structured(s) => assert_eq!(claim.label, s.label()),
            other => panic!("expected structured value, got {other:?}"),
        }
    }

    #[test]
    fn test_structured_kind() {
        let value = ClaimValue::Structured(Structured::Location(Location::default()));
        assert_eq!("location", value.kind());
    }
}
