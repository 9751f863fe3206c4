//! Decoder capability: the read side of a transcode.
//!
//! A decoder is a stateful view over a token. Claims are produced
//! sequentially at the current nesting level, while submodules are addressed
//! by index so that the whole tree can be replayed exactly after
//! [`Decoder::rewind`].
//!
//! # Navigation
//!
//! ```text
//! top level ── next_claim()* ── enter_submodule(0) ── ... ── exit_submodule()
//!                               enter_submodule(1) ── ...
//!                               enter_submodule(n) → NoMore
//! ```
//!
//! Every successful `enter_submodule` that returns
//! [`SubmoduleEntry::Entered`] must be balanced by exactly one
//! `exit_submodule`. An index reported as [`SubmoduleEntry::NestedToken`]
//! is not entered; its bytes are fetched with [`Decoder::nested_token`].
//!
//! # Implementation Guide
//!
//! Formats that parse the whole token up front can delegate navigation to
//! [`TreeDecoder`](crate::tree::TreeDecoder). Integrity or signature
//! verification must complete before the first claim is exposed.

use crate::claim::Claim;
use crate::error::Error;
use crate::tree::NestedToken;

/// Result of asking for the submodule at some index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmoduleEntry {
    /// The decoder has descended into the named submodule.
    Entered(String),
    /// The slot holds an opaque nested token with the given name. The
    /// decoder did not descend.
    NestedToken(String),
    /// The index is at or past the number of submodules at this level.
    NoMore,
}

/// Source of claims and submodule boundaries.
///
/// # Errors
///
/// The error type converts into [`Error`], so that the processor can
/// surface collaborator failures tagged with the layer they came from.
/// Reaching the end of a sequence is never an error.
pub trait Decoder {
    /// The error type returned when decoding fails.
    type Error: Into<Error>;

    /// Returns the next claim at the current level, or `None` once the
    /// claims at this level are exhausted.
    fn next_claim(&mut self) -> Result<Option<Claim>, Self::Error>;

    /// Attempts to descend into the submodule at `index` (0-based,
    /// contiguous) relative to the current level.
    fn enter_submodule(&mut self, index: usize) -> Result<SubmoduleEntry, Self::Error>;

    /// Returns to the parent level. Calling this at the top level is an
    /// error.
    fn exit_submodule(&mut self) -> Result<(), Self::Error>;

    /// Retrieves the opaque nested token at `index` without entering it.
    ///
    /// Only valid for an index that [`Decoder::enter_submodule`] reported as
    /// [`SubmoduleEntry::NestedToken`].
    fn nested_token(&mut self, index: usize) -> Result<NestedToken, Self::Error>;

    /// Resets the decoder to the top level with the claim cursor at the
    /// first claim. Idempotent.
    fn rewind(&mut self);
}
