//! The transcoding processor.
//!
//! [`Transcoder::run`] drains a [`Decoder`] into an [`Encoder`]:
//!
//! 1. every claim at the current level is forwarded with `output_claim`;
//! 2. submodule slots are visited by index, `0, 1, 2, …` until `NoMore`;
//! 3. an entered submodule is opened on the encoder, walked the same way,
//!    then exited and closed;
//! 4. an opaque nested token is fetched and forwarded verbatim, never
//!    entered.
//!
//! The top level always brackets its entries in one submodules section,
//! even when empty. A nested level opens a section only when it has at
//! least one entry.
//!
//! The walk uses an explicit stack bounded by [`Transcoder::max_depth`], so
//! a hostile, deeply nested token fails with
//! [`Error::DepthExceeded`] instead of exhausting the call stack. The first
//! error at any level aborts the whole transcode.

use tracing::{debug, debug_span, trace};

use crate::decoder::{Decoder, SubmoduleEntry};
use crate::encoder::{Encoder, SubmoduleHandle};
use crate::error::{Capability, Error};

/// Default bound on submodule nesting.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Configured processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transcoder {
    max_depth: usize,
}

impl Default for Transcoder {
    fn default() -> Self {
        Transcoder {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

struct Level {
    next: usize,
    section_open: bool,
    handle: Option<SubmoduleHandle>,
}

impl Transcoder {
    pub fn new() -> Self {
        Transcoder::default()
    }

    /// Sets the deepest submodule nesting accepted. `0` rejects any
    /// submodule.
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn depth_limit(&self) -> usize {
        self.max_depth
    }

    /// Forwards every claim, submodule and nested token from `decoder` to
    /// `encoder`, in decoder order.
    pub fn run<D, E>(&self, decoder: &mut D, encoder: &mut E) -> Result<(), Error>
    where
        D: Decoder + ?Sized,
        E: Encoder + ?Sized,
    {
        let _span = debug_span!("transcode", max_depth = self.max_depth).entered();

        let claims = forward_claims(decoder, encoder)?;
        trace!(claims, "top level claims forwarded");
        encoder.start_submodules_section().map_err(Into::into)?;

        let mut levels = vec![Level {
            next: 0,
            section_open: true,
            handle: None,
        }];

        while let Some(level) = levels.last_mut() {
            let index = level.next;
            match decoder.enter_submodule(index).map_err(Into::into)? {
                SubmoduleEntry::NoMore => {
                    if level.section_open {
                        encoder.end_submodules_section().map_err(Into::into)?;
                    }
                    if let Some(handle) = level.handle.take() {
                        decoder.exit_submodule().map_err(Into::into)?;
                        encoder.close_submodule(handle).map_err(Into::into)?;
                    }
                    levels.pop();
                }
                SubmoduleEntry::Entered(name) => {
                    level.next += 1;
                    open_section(level, encoder)?;
                    let depth = levels.len();
                    if depth > self.max_depth {
                        return Err(Error::DepthExceeded(self.max_depth));
                    }
                    debug!(depth, index, name = %name, "entering submodule");
                    let handle = encoder.open_submodule(&name).map_err(Into::into)?;
                    let claims = forward_claims(decoder, encoder)?;
                    trace!(claims, "submodule claims forwarded");
                    levels.push(Level {
                        next: 0,
                        section_open: false,
                        handle: Some(handle),
                    });
                }
                SubmoduleEntry::NestedToken(name) => {
                    level.next += 1;
                    open_section(level, encoder)?;
                    let sink = encoder
                        .nested_tokens()
                        .ok_or(Error::Unsupported(Capability::NestedToken))?;
                    let token = decoder.nested_token(index).map_err(Into::into)?;
                    debug!(index, name = %name, len = token.bytes.len(), "forwarding nested token");
                    sink.output_nested_token(&token).map_err(Into::into)?;
                }
            }
        }

        Ok(())
    }
}

/// Runs the default [`Transcoder`].
pub fn transcode<D, E>(decoder: &mut D, encoder: &mut E) -> Result<(), Error>
where
    D: Decoder + ?Sized,
    E: Encoder + ?Sized,
{
    Transcoder::default().run(decoder, encoder)
}

fn forward_claims<D, E>(decoder: &mut D, encoder: &mut E) -> Result<usize, Error>
where
    D: Decoder + ?Sized,
    E: Encoder + ?Sized,
{
    let mut count = 0;
    while let Some(claim) = decoder.next_claim().map_err(Into::into)? {
        trace!(label = claim.label, kind = claim.value.kind(), "forwarding claim");
        encoder.output_claim(&claim).map_err(Into::into)?;
        count += 1;
    }
    Ok(count)
}

fn open_section<E: Encoder + ?Sized>(level: &mut Level, encoder: &mut E) -> Result<(), Error> {
    if !level.section_open {
        encoder.start_submodules_section().map_err(Into::into)?;
        level.section_open = true;
    }
    Ok(())
}
