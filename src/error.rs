//! Error type shared by every fallible operation in the crate.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A label that is not present in the label map.
    UnknownLabel(String),
    InvalidConfig(String),
    InvalidShape(String),
    InvalidData(String),
    InvalidSnapshot(String),
    /// `backward` was called without a preceding `forward`.
    CacheNotReady,
    /// `backward` was called with a batch whose size differs from the cached one.
    BatchMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Json(err) => write!(f, "json error: {err}"),
            Error::UnknownLabel(label) => write!(f, "unknown label: {label:?}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidShape(msg) => write!(f, "invalid shape: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidSnapshot(msg) => write!(f, "invalid snapshot: {msg}"),
            Error::CacheNotReady => {
                write!(f, "backward called before forward: no cached activations")
            }
            Error::BatchMismatch { expected, found } => write!(
                f,
                "batch size mismatch: forward cache holds {expected} examples, got {found}"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
