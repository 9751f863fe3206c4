//! Encoder capability: the write side of a transcode.
//!
//! An encoder's structure is append-only and strictly hierarchical:
//!
//! ```text
//! output_claim()*
//! start_submodules_section()
//!     open_submodule("a") → handle
//!         output_claim()*
//!         [start_submodules_section() ... end_submodules_section()]
//!     close_submodule(handle)
//!     output_nested_token(..)        (optional capability)
//! end_submodules_section()
//! ```
//!
//! Submodules may only be opened inside an open submodules section and
//! must be closed in reverse order. [`Encoder::open_submodule`] returns a
//! [`SubmoduleHandle`] that has to be handed back to
//! [`Encoder::close_submodule`]; the handle cannot be cloned, so a caller
//! cannot close the same submodule twice.

use crate::claim::Claim;
use crate::error::Error;
use crate::tree::NestedToken;

/// Proof that a submodule was opened at a given depth.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a submodule handle must be passed to close_submodule"]
pub struct SubmoduleHandle {
    depth: usize,
}

impl SubmoduleHandle {
    /// Creates a handle for a submodule opened at `depth` (1 for a
    /// submodule of the top level). Called by encoder implementations.
    pub fn new(depth: usize) -> Self {
        SubmoduleHandle { depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Sink of claims and submodule boundaries.
pub trait Encoder {
    /// The error type returned when encoding fails.
    type Error: Into<Error>;

    /// Appends one claim at the current position.
    fn output_claim(&mut self, claim: &Claim) -> Result<(), Self::Error>;

    /// Opens a run of zero or more submodules at the current level.
    fn start_submodules_section(&mut self) -> Result<(), Self::Error>;

    /// Closes the submodules section opened at the current level.
    fn end_submodules_section(&mut self) -> Result<(), Self::Error>;

    /// Opens a submodule inside the current submodules section.
    fn open_submodule(&mut self, name: &str) -> Result<SubmoduleHandle, Self::Error>;

    /// Closes the most recently opened submodule.
    fn close_submodule(&mut self, handle: SubmoduleHandle) -> Result<(), Self::Error>;

    /// Returns the nested-token sink, or `None` when the format cannot
    /// carry opaque tokens verbatim.
    fn nested_tokens(&mut self) -> Option<&mut dyn NestedTokenSink<Error = Self::Error>> {
        None
    }
}

/// Optional encoder capability: emitting an already-serialized token as a
/// submodule entry without opening it structurally.
pub trait NestedTokenSink {
    type Error;

    fn output_nested_token(&mut self, token: &NestedToken) -> Result<(), Self::Error>;
}
