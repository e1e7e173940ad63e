//! Error taxonomy shared by every capability.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A capability was switched off by configuration, or its API key is absent.
    #[error("{0}")]
    ConfigurationMissing(String),

    /// The backend a capability depends on is not present in this deployment.
    #[error("{0}")]
    ResourceUnavailable(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("could not decode image: {0}")]
    Decode(String),

    /// Constructing a pipeline failed (download, out of memory, unsupported device).
    #[error("failed to load {slot}: {reason}")]
    ResourceLoadFailed { slot: String, reason: String },

    /// The backend raised while serving an actual request.
    #[error("{0}")]
    ExternalCallFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn load_failed(slot: impl ToString, reason: impl ToString) -> Self {
        Self::ResourceLoadFailed {
            slot: slot.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn external(err: impl std::fmt::Display) -> Self {
        Self::ExternalCallFailed(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => Self::Io(io),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<candle_core::Error> for Error {
    fn from(err: candle_core::Error) -> Self {
        Self::ExternalCallFailed(format!("tensor operation failed: {err}"))
    }
}
