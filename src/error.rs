//! Error types for petalplay

use std::sync::Arc;
use thiserror::Error;

/// Opaque cause carried by [`CoreError::Io`].
pub type IoCause = Arc<dyn std::error::Error + Send + Sync>;

/// Every failure the player or a capability can report.
///
/// Messages are diagnostic only. Two errors compare equal when they belong to
/// the same category, so `CoreError::Io` never compares its wrapped cause.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[source] IoCause),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Fieldless category of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    NotFound,
    Io,
    Decode,
    Unsupported,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Wraps any error as an opaque I/O cause.
    pub fn io<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Io(Arc::new(cause))
    }

    /// Builds an I/O error from a plain message, for backends whose failures
    /// are not `std::error::Error` values.
    pub fn io_msg(message: impl Into<String>) -> Self {
        Self::io(std::io::Error::other(message.into()))
    }
}

impl PartialEq for CoreError {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
