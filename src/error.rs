// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the pose inference library.

use std::fmt;

/// Result type alias for pose inference operations.
pub type Result<T> = std::result::Result<T, PoseError>;

/// Main error type for the pose inference library.
#[derive(Debug)]
pub enum PoseError {
    /// Invalid configuration (raised when a stage or pipeline is built or wired wrong).
    ConfigError(String),
    /// Array shape or cardinality does not match what a stage expects.
    ShapeMismatch(String),
    /// A head, value, output or context key is missing.
    MissingKey(String),
    /// Error reported by the external model during inference.
    InferenceError(String),
    /// Error building or writing exported predictions.
    ExportError(String),
    /// Wrapped `std::io::Error`
    Io(std::io::Error),
    /// Wrapped `serde_json::Error`
    Json(serde_json::Error),
}

impl fmt::Display for PoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::ShapeMismatch(msg) => write!(f, "Shape mismatch: {msg}"),
            Self::MissingKey(msg) => write!(f, "Missing key: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ExportError(msg) => write!(f, "Export error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Json(err) => write!(f, "JSON error: {err}"),
        }
    }
}

impl std::error::Error for PoseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PoseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for PoseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<ndarray::ShapeError> for PoseError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::ShapeMismatch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoseError::ConfigError("test".to_string());
        assert_eq!(err.to_string(), "Config error: test");

        let err = PoseError::MissingKey("bodypart/poses".to_string());
        assert_eq!(err.to_string(), "Missing key: bodypart/poses");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let err = PoseError::from(std::io::Error::other("disk full"));
        assert!(err.source().is_some());

        let err = PoseError::ShapeMismatch("3 != 2".to_string());
        assert!(err.source().is_none());
    }
}
