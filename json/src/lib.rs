//! JSON rendering of claim sets.
//!
//! A token becomes one object. Claims are keyed by their decimal label,
//! submodules sit under [`SUBMODS_KEY`] as named objects and nested tokens
//! as base64url strings next to them:
//!
//! ```text
//! {"1":5,"2":"alice","submods":{"dev1":{"3":false},"attest":{"kind":2,"token":"eyJ..."}}}
//! ```
//!
//! A nested token is an object carrying its format code and its bytes,
//! `{"kind":2,"token":"eyJ..."}`. Byte strings are base64url without
//! padding. Doubles that JSON cannot represent (NaN, infinities) are written
//! as `null`. Output is produced in a single streaming pass.
//!
//! JSON objects cannot hold the same key twice, so a repeated claim label or
//! a repeated submodule name within one level fails the transcode.

use std::collections::HashSet;
use std::io;
use std::mem;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use serde_json::{Number, Value};
use tracing::trace;
use transclaim::buf::OutBuf;
use transclaim::claim::{Claim, ClaimValue, Structured};
use transclaim::encoder::{Encoder, NestedTokenSink, SubmoduleHandle};
use transclaim::render::Render;
use transclaim::tree::NestedToken;
use transclaim::Capability;

pub mod error;

pub use error::Error;

/// Key holding a token's submodules.
pub const SUBMODS_KEY: &str = "submods";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    NotStarted,
    Open,
    Ended,
}

#[derive(Debug)]
enum Frame {
    Token { keys: HashSet<String>, section: Section },
    // the submods object is only written once the section has an entry
    Section { keys: HashSet<String>, written: bool },
}

/// Records `key` as written to an object. Returns whether it is the
/// object's first key.
fn insert_key(keys: &mut HashSet<String>, key: &str) -> Result<bool, transclaim::Error> {
    let first = keys.is_empty();
    if !keys.insert(key.to_string()) {
        return Err(transclaim::Error::Structure(format!(
            "key {key:?} repeated within one JSON object"
        )));
    }
    Ok(first)
}

/// Streaming JSON encoder.
///
/// Generic over the `serde_json` formatter so that [`JsonEncoder::new`]
/// writes compact text and [`JsonEncoder::pretty`] indents.
#[derive(Debug)]
pub struct JsonEncoder<F = CompactFormatter> {
    out: OutBuf,
    formatter: F,
    frames: Vec<Frame>,
    submodules: usize,
}

impl JsonEncoder<CompactFormatter> {
    pub fn new() -> Self {
        JsonEncoder::with_formatter(CompactFormatter)
    }
}

impl Default for JsonEncoder<CompactFormatter> {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonEncoder<PrettyFormatter<'static>> {
    pub fn pretty() -> Self {
        JsonEncoder::with_formatter(PrettyFormatter::new())
    }
}

impl<F: Formatter> JsonEncoder<F> {
    pub fn with_formatter(formatter: F) -> Self {
        JsonEncoder {
            out: OutBuf::growable(),
            formatter,
            frames: Vec::new(),
            submodules: 0,
        }
    }

    fn io(
        &mut self,
        f: impl FnOnce(&mut F, &mut OutBuf) -> io::Result<()>,
    ) -> Result<(), transclaim::Error> {
        f(&mut self.formatter, &mut self.out).map_err(|e| Error::Io(e).into())
    }

    fn key(&mut self, first: bool, key: &str) -> Result<(), transclaim::Error> {
        self.io(|f, out| f.begin_object_key(out, first))?;
        self.scalar(key)?;
        self.io(|f, out| f.end_object_key(out))?;
        self.io(|f, out| f.begin_object_value(out))
    }

    fn scalar<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), transclaim::Error> {
        serde_json::to_writer(&mut self.out, value).map_err(Error::Json)?;
        Ok(())
    }

    fn value(&mut self, value: &Value) -> Result<(), transclaim::Error> {
        match value {
            Value::Object(map) => {
                self.io(|f, out| f.begin_object(out))?;
                for (i, (k, v)) in map.iter().enumerate() {
                    self.key(i == 0, k)?;
                    self.value(v)?;
                    self.io(|f, out| f.end_object_value(out))?;
                }
                self.io(|f, out| f.end_object(out))
            }
            other => self.scalar(other),
        }
    }

    /// Writes the key of the next section entry, opening the submods
    /// object first if needed.
    fn section_entry(&mut self, name: &str) -> Result<(), transclaim::Error> {
        let depth = self.frames.len();
        let open_object = match self.frames.last_mut() {
            Some(Frame::Section { written, .. }) => !mem::replace(written, true),
            _ => {
                return Err(transclaim::Error::Structure(format!(
                    "entry {name:?} outside of a submodules section"
                )));
            }
        };
        if open_object {
            let first = match depth.checked_sub(2).and_then(|i| self.frames.get_mut(i)) {
                Some(Frame::Token { keys, .. }) => insert_key(keys, SUBMODS_KEY)?,
                _ => return Err(transclaim::Error::Structure("section outside of a token".into())),
            };
            self.key(first, SUBMODS_KEY)?;
            self.io(|f, out| f.begin_object(out))?;
        }
        let first = match self.frames.last_mut() {
            Some(Frame::Section { keys, .. }) => insert_key(keys, name)?,
            _ => return Err(transclaim::Error::Structure("section frame missing".into())),
        };
        self.key(first, name)
    }
}

impl<F: Formatter> Encoder for JsonEncoder<F> {
    type Error = transclaim::Error;

    fn output_claim(&mut self, claim: &Claim) -> Result<(), transclaim::Error> {
        let key = claim.label.to_string();
        let first = match self.frames.last_mut() {
            Some(Frame::Token {
                keys,
                section: Section::NotStarted,
            }) => insert_key(keys, &key)?,
            _ => {
                return Err(transclaim::Error::Structure(format!(
                    "claim {} outside of a token body",
                    claim.label
                )));
            }
        };
        let value = claim_value(&claim.value)?;
        self.key(first, &key)?;
        self.value(&value)?;
        self.io(|f, out| f.end_object_value(out))
    }

    fn start_submodules_section(&mut self) -> Result<(), transclaim::Error> {
        match self.frames.last_mut() {
            Some(Frame::Token { section, .. }) if *section == Section::NotStarted => {
                *section = Section::Open;
            }
            _ => {
                return Err(transclaim::Error::Structure(
                    "submodules section started twice or outside of a token".into(),
                ));
            }
        }
        self.frames.push(Frame::Section {
            keys: HashSet::new(),
            written: false,
        });
        Ok(())
    }

    fn end_submodules_section(&mut self) -> Result<(), transclaim::Error> {
        let Some(Frame::Section { written, .. }) = self.frames.pop() else {
            return Err(transclaim::Error::Structure("no submodules section to end".into()));
        };
        if written {
            self.io(|f, out| f.end_object(out))?;
            self.io(|f, out| f.end_object_value(out))?;
        }
        match self.frames.last_mut() {
            Some(Frame::Token { section, .. }) if *section == Section::Open => {
                *section = Section::Ended;
                Ok(())
            }
            _ => Err(transclaim::Error::Structure("submodules section outside of a token".into())),
        }
    }

    fn open_submodule(&mut self, name: &str) -> Result<SubmoduleHandle, transclaim::Error> {
        self.section_entry(name)?;
        self.io(|f, out| f.begin_object(out))?;
        self.frames.push(Frame::Token {
            keys: HashSet::new(),
            section: Section::NotStarted,
        });
        self.submodules += 1;
        trace!(name, depth = self.submodules, "submodule object opened");
        Ok(SubmoduleHandle::new(self.submodules))
    }

    fn close_submodule(&mut self, handle: SubmoduleHandle) -> Result<(), transclaim::Error> {
        if handle.depth() != self.submodules || self.submodules == 0 {
            return Err(transclaim::Error::Structure(format!(
                "closing submodule at depth {} while at depth {}",
                handle.depth(),
                self.submodules
            )));
        }
        match self.frames.pop() {
            Some(Frame::Token { section, .. }) if section != Section::Open => {}
            _ => {
                return Err(transclaim::Error::Structure(
                    "submodule closed with an open section".into(),
                ));
            }
        }
        self.io(|f, out| f.end_object(out))?;
        self.io(|f, out| f.end_object_value(out))?;
        self.submodules -= 1;
        Ok(())
    }

    fn nested_tokens(&mut self) -> Option<&mut dyn NestedTokenSink<Error = transclaim::Error>> {
        Some(self as &mut dyn NestedTokenSink<Error = transclaim::Error>)
    }
}

impl<F: Formatter> NestedTokenSink for JsonEncoder<F> {
    type Error = transclaim::Error;

    fn output_nested_token(&mut self, token: &NestedToken) -> Result<(), transclaim::Error> {
        self.section_entry(&token.name)?;
        self.io(|f, out| f.begin_object(out))?;
        self.key(true, "kind")?;
        self.scalar(&token.kind.code())?;
        self.io(|f, out| f.end_object_value(out))?;
        self.key(false, "token")?;
        self.scalar(&URL_SAFE_NO_PAD.encode(&token.bytes))?;
        self.io(|f, out| f.end_object_value(out))?;
        self.io(|f, out| f.end_object(out))?;
        self.io(|f, out| f.end_object_value(out))
    }
}

impl<F: Formatter> Render for JsonEncoder<F> {
    fn supports_streaming(&self) -> bool {
        true
    }

    fn start(&mut self, out: OutBuf) -> Result<(), transclaim::Error> {
        self.out = out;
        self.frames = vec![Frame::Token {
            keys: HashSet::new(),
            section: Section::NotStarted,
        }];
        self.submodules = 0;
        self.io(|f, out| f.begin_object(out))
    }

    fn finish(&mut self) -> Result<OutBuf, transclaim::Error> {
        match self.frames.as_slice() {
            [Frame::Token { section, .. }] if *section != Section::Open => {}
            _ => {
                return Err(transclaim::Error::Structure(
                    "token finished with open objects".into(),
                ));
            }
        }
        self.frames.clear();
        self.io(|f, out| f.end_object(out))?;
        Ok(mem::replace(&mut self.out, OutBuf::growable()))
    }
}

fn claim_value(value: &ClaimValue) -> Result<Value, transclaim::Error> {
    let value = match value {
        ClaimValue::Int64(v) => Value::from(*v),
        ClaimValue::UInt64(v) => Value::from(*v),
        ClaimValue::Double(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        ClaimValue::Text(v) => Value::String(v.clone()),
        ClaimValue::Bytes(v) => Value::String(URL_SAFE_NO_PAD.encode(v)),
        ClaimValue::Bool(v) => Value::Bool(*v),
        ClaimValue::Null => Value::Null,
        ClaimValue::Structured(Structured::Location(location)) => {
            serde_json::to_value(location).map_err(Error::Json)?
        }
        ClaimValue::Structured(_) => {
            return Err(transclaim::Error::Unsupported(Capability::StructuredValue));
        }
    };
    Ok(value)
}
