//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for Lookout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the capture pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Frame could not be converted into a still image
    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    /// Face classifier failed on a frame
    #[error("detection error: {0}")]
    Detection(String),

    /// Upload transport failure (connection, timeout, request build)
    #[error("upload error: {0}")]
    Upload(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("server error {status}: {body}")]
    Server {
        /// HTTP status returned by the endpoint
        status: reqwest::StatusCode,
        /// Response body, if any
        body: String,
    },

    /// Endpoint answered successfully but without audio
    #[error("empty response from endpoint")]
    EmptyResponse,

    /// Audio decoding or device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Frame source error
    #[error("camera error: {0}")]
    Camera(String),

    /// Service built outside a tokio runtime
    #[error("no tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from the upload leg (transport, status, or empty body)
    #[must_use]
    pub const fn is_upload_failure(&self) -> bool {
        matches!(
            self,
            Self::Upload(_) | Self::Http(_) | Self::Server { .. } | Self::EmptyResponse
        )
    }
}
