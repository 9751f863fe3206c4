//! In-memory claim tree.
//!
//! [`Module`] is a fully materialized token: its claims followed by an
//! ordered list of entries, each either a submodule or an opaque nested
//! token. Formats that parse eagerly build a `Module` and serve it through
//! [`TreeDecoder`]; [`TreeEncoder`] rebuilds a `Module` from an encoder call
//! stream.

use std::borrow::Borrow;

use crate::claim::Claim;
use crate::decoder::{Decoder, SubmoduleEntry};
use crate::encoder::{Encoder, NestedTokenSink, SubmoduleHandle};
use crate::error::Error;

/// Format of an opaque nested token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Binary claim set.
    ClaimSet,
    /// JSON text token.
    Json,
    /// Any other format, identified by a collaborator-defined number.
    Other(u32),
}

impl TokenKind {
    pub fn code(self) -> u32 {
        match self {
            TokenKind::ClaimSet => 1,
            TokenKind::Json => 2,
            TokenKind::Other(n) => n,
        }
    }
}

impl From<u32> for TokenKind {
    fn from(value: u32) -> Self {
        match value {
            1 => TokenKind::ClaimSet,
            2 => TokenKind::Json,
            n => TokenKind::Other(n),
        }
    }
}

/// An already-serialized token carried as an uninterpreted blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedToken {
    pub kind: TokenKind,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NestedToken {
    pub fn new(kind: TokenKind, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        NestedToken {
            kind,
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// One slot of a submodules section.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Submodule { name: String, module: Module },
    Token(NestedToken),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Submodule { name, .. } => name,
            Entry::Token(token) => &token.name,
        }
    }
}

/// A token body: claims, then submodule entries. Entry names may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub claims: Vec<Claim>,
    pub entries: Vec<Entry>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn with_claims(claims: Vec<Claim>) -> Self {
        Module {
            claims,
            entries: Vec::new(),
        }
    }

    pub fn push_submodule(&mut self, name: impl Into<String>, module: Module) {
        self.entries.push(Entry::Submodule {
            name: name.into(),
            module,
        });
    }

    pub fn push_token(&mut self, token: NestedToken) {
        self.entries.push(Entry::Token(token));
    }

    /// Deepest submodule nesting below this module.
    pub fn depth(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Submodule { module, .. } => Some(module.depth() + 1),
                Entry::Token(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Step {
    entry: usize,
    saved_cursor: usize,
}

/// Decoder over a [`Module`], owned or borrowed.
///
/// The position is an index path from the root, so rewinding and replaying
/// is exact and cheap.
#[derive(Debug, Clone)]
pub struct TreeDecoder<M> {
    root: M,
    path: Vec<Step>,
    cursor: usize,
}

impl<M: Borrow<Module>> TreeDecoder<M> {
    pub fn new(root: M) -> Self {
        TreeDecoder {
            root,
            path: Vec::new(),
            cursor: 0,
        }
    }

    pub fn module(&self) -> &Module {
        self.root.borrow()
    }

    /// Number of submodules currently entered.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn into_inner(self) -> M {
        self.root
    }

    fn current(&self) -> Result<&Module, Error> {
        self.path.iter().try_fold(self.root.borrow(), |module, step| {
            match module.entries.get(step.entry) {
                Some(Entry::Submodule { module, .. }) => Ok(module),
                _ => Err(Error::structure(format!(
                    "cursor path points at a missing submodule {}",
                    step.entry
                ))),
            }
        })
    }
}

impl<M: Borrow<Module>> Decoder for TreeDecoder<M> {
    type Error = Error;

    fn next_claim(&mut self) -> Result<Option<Claim>, Error> {
        let claim = self.current()?.claims.get(self.cursor).cloned();
        if claim.is_some() {
            self.cursor += 1;
        }
        Ok(claim)
    }

    fn enter_submodule(&mut self, index: usize) -> Result<SubmoduleEntry, Error> {
        let entry = match self.current()?.entries.get(index) {
            None => return Ok(SubmoduleEntry::NoMore),
            Some(Entry::Token(token)) => return Ok(SubmoduleEntry::NestedToken(token.name.clone())),
            Some(Entry::Submodule { name, .. }) => SubmoduleEntry::Entered(name.clone()),
        };
        self.path.push(Step {
            entry: index,
            saved_cursor: self.cursor,
        });
        self.cursor = 0;
        Ok(entry)
    }

    fn exit_submodule(&mut self) -> Result<(), Error> {
        let step = self
            .path
            .pop()
            .ok_or_else(|| Error::structure("exit_submodule called at the top level"))?;
        self.cursor = step.saved_cursor;
        Ok(())
    }

    fn nested_token(&mut self, index: usize) -> Result<NestedToken, Error> {
        match self.current()?.entries.get(index) {
            Some(Entry::Token(token)) => Ok(token.clone()),
            Some(Entry::Submodule { name, .. }) => Err(Error::structure(format!(
                "entry {index} ({name}) is a submodule, not a nested token"
            ))),
            None => Err(Error::structure(format!("no entry at index {index}"))),
        }
    }

    fn rewind(&mut self) {
        self.path.clear();
        self.cursor = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    NotStarted,
    Open,
    Ended,
}

#[derive(Debug)]
struct Level {
    name: String,
    module: Module,
    section: Section,
}

impl Level {
    fn new(name: String) -> Self {
        Level {
            name,
            module: Module::new(),
            section: Section::NotStarted,
        }
    }
}

/// Encoder that rebuilds a [`Module`] and checks the structural rules of
/// the encoder contract along the way.
#[derive(Debug)]
pub struct TreeEncoder {
    levels: Vec<Level>,
}

impl Default for TreeEncoder {
    fn default() -> Self {
        TreeEncoder::new()
    }
}

impl TreeEncoder {
    pub fn new() -> Self {
        TreeEncoder {
            levels: vec![Level::new(String::new())],
        }
    }

    /// Returns the built module. Fails if a submodule or section is still
    /// open.
    pub fn finish(mut self) -> Result<Module, Error> {
        if self.levels.len() != 1 {
            return Err(Error::structure(format!(
                "{} submodule(s) still open",
                self.levels.len() - 1
            )));
        }
        let root = self.levels.pop().ok_or_else(|| Error::structure("no root level"))?;
        if root.section == Section::Open {
            return Err(Error::structure("submodules section still open"));
        }
        Ok(root.module)
    }

    fn top(&mut self) -> Result<&mut Level, Error> {
        self.levels
            .last_mut()
            .ok_or_else(|| Error::structure("encoder already finished"))
    }

    fn section_top(&mut self) -> Result<&mut Level, Error> {
        let level = self.top()?;
        if level.section != Section::Open {
            return Err(Error::structure("no submodules section is open"));
        }
        Ok(level)
    }
}

impl Encoder for TreeEncoder {
    type Error = Error;

    fn output_claim(&mut self, claim: &Claim) -> Result<(), Error> {
        let level = self.top()?;
        if level.section != Section::NotStarted {
            return Err(Error::structure(format!(
                "claim {} output after the submodules section",
                claim.label
            )));
        }
        level.module.claims.push(claim.clone());
        Ok(())
    }

    fn start_submodules_section(&mut self) -> Result<(), Error> {
        let level = self.top()?;
        if level.section != Section::NotStarted {
            return Err(Error::structure("submodules section already started"));
        }
        level.section = Section::Open;
        Ok(())
    }

    fn end_submodules_section(&mut self) -> Result<(), Error> {
        self.section_top()?.section = Section::Ended;
        Ok(())
    }

    fn open_submodule(&mut self, name: &str) -> Result<SubmoduleHandle, Error> {
        self.section_top()?;
        self.levels.push(Level::new(name.to_string()));
        Ok(SubmoduleHandle::new(self.levels.len() - 1))
    }

    fn close_submodule(&mut self, handle: SubmoduleHandle) -> Result<(), Error> {
        let depth = self.levels.len() - 1;
        if depth == 0 || handle.depth() != depth {
            return Err(Error::structure(format!(
                "close_submodule for depth {} but current depth is {depth}",
                handle.depth()
            )));
        }
        let level = self.levels.pop().ok_or_else(|| Error::structure("no open submodule"))?;
        if level.section == Section::Open {
            return Err(Error::structure(format!(
                "submodule {} closed with its submodules section open",
                level.name
            )));
        }
        self.section_top()?.module.push_submodule(level.name, level.module);
        Ok(())
    }

    fn nested_tokens(&mut self) -> Option<&mut dyn NestedTokenSink<Error = Error>> {
        Some(self as &mut dyn NestedTokenSink<Error = Error>)
    }
}

impl NestedTokenSink for TreeEncoder {
    type Error = Error;

    fn output_nested_token(&mut self, token: &NestedToken) -> Result<(), Error> {
        self.section_top()?.module.push_token(token.clone());
        Ok(())
    }
}
