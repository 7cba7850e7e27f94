use thiserror::Error;

/// An operation could not be computed for the given buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("{0}")]
    Invalid(String),

    /// Raised by a kernel that observed its cancellation flag.
    #[error("operation cancelled")]
    Cancelled,
}

impl OperationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A persisted ops or macro string could not be decoded.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Malformed operation data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognised operation format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported operation format version: {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Image has been closed")]
    Closed,

    #[error("No image is open")]
    NoImage,

    #[error("Image has no file to save to")]
    NoPath,
}

pub type Result<T> = std::result::Result<T, EngineError>;
pub type OpResult<T> = std::result::Result<T, OperationError>;
