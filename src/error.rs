//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Upload content types the service accepts
pub const ALLOWED_CONTENT_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// Error types for every stage of a removal request
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Upload declared a MIME type outside [`ALLOWED_CONTENT_TYPES`]
    #[error("Invalid file type. Allowed types: {}", ALLOWED_CONTENT_TYPES.join(", "))]
    InvalidContentType {
        /// The rejected content type as sent by the client
        content_type: String,
    },

    /// Upload exceeded the configured size limit
    #[error("File too large ({size_mb:.1}MB). Maximum size is {limit_mb}MB.")]
    PayloadTooLarge {
        /// Received size in megabytes
        size_mb: f64,
        /// Configured limit in megabytes
        limit_mb: u64,
    },

    /// Upload could not be decoded as an image
    #[error("Invalid or corrupt image file: {0}")]
    CorruptImage(String),

    /// A form field was missing or out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Model session could not be created (unknown id, download, timeout, runtime)
    #[error("Model error: {0}")]
    ModelLoad(String),

    /// Every primary attempt and the fallback failed
    #[error("Background removal failed: {0}")]
    BackgroundRemoval(String),

    /// A single inference attempt failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// The result failed the alpha-channel heuristic; only drives retries
    #[error("Result validation failed: {0}")]
    ValidationHeuristic(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create an invalid content type error
    pub fn invalid_content_type<S: Into<String>>(content_type: S) -> Self {
        Self::InvalidContentType {
            content_type: content_type.into(),
        }
    }

    /// Create a payload size error from the received byte count
    pub fn payload_too_large(size_bytes: usize, limit_bytes: usize) -> Self {
        Self::PayloadTooLarge {
            size_mb: size_bytes as f64 / (1024.0 * 1024.0),
            limit_mb: (limit_bytes / (1024 * 1024)) as u64,
        }
    }

    /// Create a corrupt image error
    pub fn corrupt_image<S: Into<String>>(msg: S) -> Self {
        Self::CorruptImage(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a terminal background removal error
    pub fn background_removal<S: Into<String>>(msg: S) -> Self {
        Self::BackgroundRemoval(msg.into())
    }

    /// Create an inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a validation heuristic failure
    pub fn validation_heuristic<S: Into<String>>(msg: S) -> Self {
        Self::ValidationHeuristic(msg.into())
    }

    /// Create a network error with operation context
    pub fn network_error<E: std::fmt::Display>(operation: &str, error: E) -> Self {
        Self::Network(format!("{operation}: {error}"))
    }

    /// Create an invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range})"
        ))
    }

    /// Whether the failure is caused by the request rather than the service
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidContentType { .. }
                | Self::PayloadTooLarge { .. }
                | Self::CorruptImage(_)
                | Self::InvalidParameter(_)
        )
    }
}
