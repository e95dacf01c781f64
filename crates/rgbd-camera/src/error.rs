use crate::Size;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera not found: {0}")]
    NotFound(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("camera not started")]
    NotStarted,
    #[error("no frame available yet")]
    NoFrame,
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: Size, actual: Size },
    #[error("calibration error: {0}")]
    Calibration(String),
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for Error {
    fn from(e: opencv::Error) -> Self {
        Error::Backend(e.to_string())
    }
}
