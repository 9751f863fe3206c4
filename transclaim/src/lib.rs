//! # transclaim
//!
//! Core traits and the processor for transcoding claim-based tokens.
//!
//! This crate defines the `Decoder` and `Encoder` capabilities that every
//! token format implements, and the processor that drains one into the
//! other without knowing either wire format.
//!
//! ## Overview
//!
//! The data flow looks like this:
//! ```text
//! source bytes → Decoder → transcode() → Encoder → sink bytes
//! ```
//!
//! A decoder exposes a stream of claims plus an index-addressed tree of
//! submodules. Some submodule slots hold an opaque nested token, which is
//! carried through as a blob and never recursed into. The encoder receives
//! the same claims and submodule boundaries in the same order.
//!
//! ## Two-pass rendering
//!
//! Encoders that write into one contiguous fixed buffer implement
//! [`render::Render`]. [`render::render`] runs the processor once against a
//! measuring buffer, allocates exactly the measured size, rewinds the
//! decoder and runs again for real. Encoders that can stream skip the first
//! pass.
//!
//! ## Example
//!
//! ```
//! use transclaim::claim::Claim;
//! use transclaim::processor::transcode;
//! use transclaim::tree::{Module, TreeDecoder, TreeEncoder};
//!
//! let mut source = Module::new();
//! source.claims.push(Claim::int(1, 5));
//! source.claims.push(Claim::text(2, "alice"));
//!
//! let mut decoder = TreeDecoder::new(&source);
//! let mut encoder = TreeEncoder::new();
//! transcode(&mut decoder, &mut encoder).unwrap();
//!
//! assert_eq!(source, encoder.finish().unwrap());
//! ```

#![forbid(unsafe_code)]

pub mod buf;
pub mod claim;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod processor;
pub mod render;
pub mod tree;

pub use error::{Capability, Error, ErrorKind};
