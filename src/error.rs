//! Error types for white-background generation

use thiserror::Error;

/// Result type alias for white-background operations
pub type Result<T> = std::result::Result<T, WhiteBgError>;

/// Error types raised while loading, segmenting, compositing or saving images
#[derive(Error, Debug)]
pub enum WhiteBgError {
    /// Missing input path or unsupported file extension
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The segmentation model could not be made available
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// A segmentation backend failed on a specific image
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    /// Model inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model download failures
    #[error("Download error: {0}")]
    Download(String),

    /// Processing was cancelled through the cancellation token
    #[error("Processing cancelled")]
    Cancelled,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WhiteBgError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new model unavailable error
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new download error
    pub fn download<S: Into<String>>(msg: S) -> Self {
        Self::Download(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create network error with context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Download(format!("{}: {}", context.into(), error))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Internal(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the error was caused by user cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = WhiteBgError::invalid_input("missing.jpg");
        assert!(matches!(err, WhiteBgError::InvalidInput(_)));

        let err = WhiteBgError::model_unavailable("u2net.onnx not found");
        assert!(matches!(err, WhiteBgError::ModelUnavailable(_)));

        let err = WhiteBgError::segmentation("empty rectangle");
        assert!(matches!(err, WhiteBgError::Segmentation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = WhiteBgError::invalid_config("resize target must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: resize target must be positive"
        );
        assert_eq!(WhiteBgError::Cancelled.to_string(), "Processing cancelled");
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = WhiteBgError::file_io_error("create output directory", Path::new("/out"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("create output directory"));
        assert!(error_string.contains("/out"));

        let err = WhiteBgError::config_value_error("JPEG quality", 150, "1-100", Some(95));
        let error_string = err.to_string();
        assert!(error_string.contains("JPEG quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("1-100"));
        assert!(error_string.contains("Recommended: 95"));

        let err = WhiteBgError::processing_stage_error("save", "encoder rejected image", Some("10x10 RGB"));
        let error_string = err.to_string();
        assert!(error_string.contains("save"));
        assert!(error_string.contains("10x10 RGB"));
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(WhiteBgError::Cancelled.is_cancelled());
        assert!(!WhiteBgError::internal("boom").is_cancelled());
    }
}
