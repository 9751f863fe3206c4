use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<Error> for transclaim::Error {
    fn from(e: Error) -> Self {
        transclaim::Error::Encode(Box::new(e))
    }
}
