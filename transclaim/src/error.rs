//! Error types for claim transcoding.
//!
//! End of a claim or submodule sequence is not an error: decoders report it
//! as `None` or [`SubmoduleEntry::NoMore`](crate::decoder::SubmoduleEntry)
//! so callers can tell "stop" apart from "abort".

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Boxed error raised by a format collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Optional encoder capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Emitting an already-serialized token verbatim.
    NestedToken,
    /// Carrying a structured claim payload the encoder does not know.
    StructuredValue,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::NestedToken => write!(f, "nested token output"),
            Capability::StructuredValue => write!(f, "structured claim value"),
        }
    }
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed nesting, unbalanced calls or an inconsistent index.
    Structural,
    /// An optional capability was required but is missing.
    Unsupported,
    /// The underlying format failed to parse or produce data.
    Format,
    /// Integrity or signature verification of the token failed.
    Verification,
    /// The nesting depth bound was exceeded.
    ResourceExhausted,
    /// The two-pass render protocol detected inconsistent passes.
    Internal,
}

/// Errors that can occur while transcoding a token.
#[derive(Debug, Error)]
pub enum Error {
    #[error("structure: {0}")]
    Structure(String),

    #[error("{0} is not supported by the encoder")]
    Unsupported(Capability),

    #[error("decoder: {0}")]
    Decode(#[source] BoxError),

    #[error("encoder: {0}")]
    Encode(#[source] BoxError),

    #[error("verification failed: {0}")]
    Verification(#[source] BoxError),

    #[error("submodule nesting exceeds the limit of {0}")]
    DepthExceeded(usize),

    #[error("output buffer overflow: {needed} bytes needed, {capacity} available")]
    BufferOverflow { needed: usize, capacity: usize },

    #[error("render pass needed {actual} bytes but the measuring pass reported {measured}")]
    SizeMismatch { measured: usize, actual: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Structure(_) => ErrorKind::Structural,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Decode(_) | Error::Encode(_) => ErrorKind::Format,
            Error::Verification(_) => ErrorKind::Verification,
            Error::DepthExceeded(_) => ErrorKind::ResourceExhausted,
            Error::BufferOverflow { .. } | Error::SizeMismatch { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn structure(msg: impl Into<String>) -> Self {
        Error::Structure(msg.into())
    }
}
