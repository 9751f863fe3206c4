use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Transcode(#[from] transclaim::Error),

    #[error("invalid claim argument {0:?}: expected LABEL:VALUE")]
    InvalidClaim(String),

    #[error("invalid hex in claim argument {0:?}")]
    InvalidHex(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<tlv::Error> for Error {
    fn from(e: tlv::Error) -> Self {
        Error::Transcode(e.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
