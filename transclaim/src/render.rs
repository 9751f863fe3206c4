//! Two-pass render protocol.
//!
//! Encoders that produce one contiguous buffer cannot know the final size
//! until everything has been written, yet want a buffer up front.
//! [`render`] runs the processor once against a measuring [`OutBuf`],
//! allocates exactly the measured size, rewinds the decoder and runs again.
//! Encoders that report [`Render::supports_streaming`] get a single pass
//! into a growable buffer instead.
//!
//! The decoder must replay identically after [`Decoder::rewind`] and the
//! encoder must account sizes deterministically. A second pass that does
//! not land exactly on the measured size is reported as
//! [`Error::SizeMismatch`] and is never retried.

use tracing::debug;

use crate::buf::OutBuf;
use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::Error;
use crate::processor::Transcoder;

/// An encoder that writes its output into an [`OutBuf`].
pub trait Render: Encoder {
    /// Whether one pass into a growable buffer is enough.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Resets the encoder to write a new token into `out`.
    fn start(&mut self, out: OutBuf) -> Result<(), Self::Error>;

    /// Completes the token and hands the buffer back.
    fn finish(&mut self) -> Result<OutBuf, Self::Error>;
}

/// Transcodes `decoder` into a freshly allocated buffer using `encoder`.
pub fn render<D, E>(transcoder: &Transcoder, decoder: &mut D, encoder: &mut E) -> Result<Vec<u8>, Error>
where
    D: Decoder + ?Sized,
    E: Render + ?Sized,
{
    if encoder.supports_streaming() {
        let out = pass(transcoder, decoder, encoder, OutBuf::growable())?;
        debug!(len = out.len(), "streamed token");
        return into_bytes(out);
    }

    let measured = pass(transcoder, decoder, encoder, OutBuf::measuring())?.len();
    debug!(measured, "measuring pass complete");

    decoder.rewind();
    let out = match pass(transcoder, decoder, encoder, OutBuf::fixed(measured)) {
        Ok(out) => out,
        Err(Error::BufferOverflow { needed, .. }) => {
            return Err(Error::SizeMismatch {
                measured,
                actual: needed,
            });
        }
        Err(e) => return Err(e),
    };
    if out.len() != measured {
        return Err(Error::SizeMismatch {
            measured,
            actual: out.len(),
        });
    }
    debug!(len = out.len(), "render pass complete");
    into_bytes(out)
}

fn pass<D, E>(transcoder: &Transcoder, decoder: &mut D, encoder: &mut E, out: OutBuf) -> Result<OutBuf, Error>
where
    D: Decoder + ?Sized,
    E: Render + ?Sized,
{
    encoder.start(out).map_err(Into::into)?;
    transcoder.run(decoder, encoder)?;
    encoder.finish().map_err(Into::into)
}

fn into_bytes(out: OutBuf) -> Result<Vec<u8>, Error> {
    out.into_bytes()
        .ok_or_else(|| Error::structure("encoder returned a measuring buffer from a real pass"))
}

#[cfg(test)]
mod tests {
    use super::{Render, render};
    use crate::buf::OutBuf;
    use crate::claim::{Claim, ClaimValue};
    use crate::decoder::Decoder;
    use crate::encoder::{Encoder, SubmoduleHandle};
    use crate::error::{Error, ErrorKind};
    use crate::processor::Transcoder;
    use crate::processor::tests::Event;
    use crate::tree::{Module, TreeDecoder};

    /// Writes a line per event; optionally writes extra bytes when not
    /// measuring, to simulate an encoder whose size accounting lies.
    struct LineEncoder {
        out: Option<OutBuf>,
        passes: usize,
        streaming: bool,
        lie: usize,
        events: Vec<Event>,
    }

    impl LineEncoder {
        fn new() -> Self {
            LineEncoder {
                out: None,
                passes: 0,
                streaming: false,
                lie: 0,
                events: Vec::new(),
            }
        }

        fn write(&mut self, line: String) -> Result<(), Error> {
            let out = self.out.as_mut().ok_or(Error::Structure("not started".into()))?;
            let extra = if out.is_measuring() { 0 } else { self.lie };
            out.append(line.as_bytes())?;
            out.append(&vec![b'!'; extra])?;
            out.append(b"\n")
        }
    }

    impl Encoder for LineEncoder {
        type Error = Error;

        fn output_claim(&mut self, claim: &Claim) -> Result<(), Error> {
            self.events.push(Event::Claim(claim.clone()));
            self.write(claim.to_string())
        }

        fn start_submodules_section(&mut self) -> Result<(), Error> {
            self.write("[".into())
        }

        fn end_submodules_section(&mut self) -> Result<(), Error> {
            self.write("]".into())
        }

        fn open_submodule(&mut self, name: &str) -> Result<SubmoduleHandle, Error> {
            self.events.push(Event::Open(name.to_string()));
            self.write(format!("{name} {{"))?;
            Ok(SubmoduleHandle::new(1))
        }

        fn close_submodule(&mut self, _handle: SubmoduleHandle) -> Result<(), Error> {
            self.write("}".into())
        }
    }

    impl Render for LineEncoder {
        fn supports_streaming(&self) -> bool {
            self.streaming
        }

        fn start(&mut self, out: OutBuf) -> Result<(), Error> {
            self.passes += 1;
            self.events.clear();
            self.out = Some(out);
            Ok(())
        }

        fn finish(&mut self) -> Result<OutBuf, Error> {
            self.out.take().ok_or(Error::Structure("not started".into()))
        }
    }

    fn module() -> Module {
        let mut module = Module::with_claims(vec![Claim::int(1, 5), Claim::text(2, "alice")]);
        module.push_submodule("dev1", Module::with_claims(vec![Claim::bool(3, false)]));
        module
    }

    #[test]
    fn test_two_pass_render() {
        let module = module();
        let mut decoder = TreeDecoder::new(&module);
        let mut encoder = LineEncoder::new();

        let bytes = render(&Transcoder::new(), &mut decoder, &mut encoder).unwrap();

        assert_eq!(2, encoder.passes);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!("1: 5\n2: \"alice\"\n[\ndev1 {\n3: false\n}\n]\n", text);
    }

    #[test]
    fn test_streaming_encoder_skips_measuring_pass() {
        let module = module();
        let mut decoder = TreeDecoder::new(&module);
        let mut encoder = LineEncoder::new();
        encoder.streaming = true;

        let bytes = render(&Transcoder::new(), &mut decoder, &mut encoder).unwrap();
        assert_eq!(1, encoder.passes);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_lying_measurement_is_fatal() {
        let module = module();
        let mut decoder = TreeDecoder::new(&module);
        let mut encoder = LineEncoder::new();
        encoder.lie = 1;

        let err = render(&Transcoder::new(), &mut decoder, &mut encoder).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
        assert_eq!(ErrorKind::Internal, err.kind());
    }

    #[test]
    fn test_second_pass_sees_identical_claims() {
        let module = module();
        let mut decoder = TreeDecoder::new(&module);
        let mut encoder = LineEncoder::new();
        render(&Transcoder::new(), &mut decoder, &mut encoder).unwrap();

        // A decoder that was not rewound would produce nothing on a third pass.
        decoder.rewind();
        let mut replay = LineEncoder::new();
        replay.streaming = true;
        render(&Transcoder::new(), &mut decoder, &mut replay).unwrap();
        assert_eq!(encoder.events, replay.events);
        assert!(
            replay
                .events
                .iter()
                .any(|e| matches!(e, Event::Claim(Claim { value: ClaimValue::Bool(false), .. })))
        );
    }
}
