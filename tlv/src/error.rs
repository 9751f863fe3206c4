use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parser error {0:?}")]
    Parser(nom::error::ErrorKind),
    #[error("parser incomplete: {0:?}")]
    ParserIncomplete(nom::Needed),
    #[error("empty input")]
    Empty,
    #[error("{0} trailing bytes after the token")]
    TrailingBytes(usize),
    #[error("constructed elements nested deeper than {0}")]
    TooDeep(usize),
    #[error("unexpected tag 0x{found:02x} in {context}")]
    UnexpectedTag { found: u8, context: &'static str },
    #[error("{0}: invalid encoding")]
    InvalidValue(&'static str),
    #[error("structured value under label {0}, which carries no structured payload")]
    UnexpectedStructured(i64),
}

impl<I> From<nom::Err<nom::error::Error<I>>> for Error {
    fn from(e: nom::Err<nom::error::Error<I>>) -> Self {
        match e {
            nom::Err::Incomplete(needed) => Error::ParserIncomplete(needed),
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::Parser(e.code),
        }
    }
}

impl From<Error> for transclaim::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::TooDeep(limit) => transclaim::Error::DepthExceeded(limit),
            other => transclaim::Error::Decode(Box::new(other)),
        }
    }
}
