use std::path::PathBuf;

use burn::record::RecorderError;
use thiserror::Error;

/// Failure to turn an external image payload into a pixel grid.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload had no content after the optional data-URI prefix.
    #[error("image payload is empty")]
    Empty,

    /// The payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not an image format we can read.
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised by the classifier pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A tensor reached the model with the wrong layout. This is a pipeline bug.
    #[error("expected input of shape {expected:?}, got {actual:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("model snapshot not found at {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("unable to read or write model snapshot: {0}")]
    Record(#[from] RecorderError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unable to read tensor data: {0}")]
    TensorData(String),

    #[error("inference workers are not running")]
    Unavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the request payload rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_client_errors() {
        let err: Error = DecodeError::Empty.into();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "image payload is empty");
    }

    #[test]
    fn shape_error_is_not_a_client_error() {
        let err = Error::Shape {
            expected: vec![1, 28, 28],
            actual: vec![3, 28, 28],
        };
        assert!(!err.is_client_error());
        assert_eq!(
            err.to_string(),
            "expected input of shape [1, 28, 28], got [3, 28, 28]"
        );
    }
}
