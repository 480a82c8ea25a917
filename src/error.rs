//! Error types for Whilr
//!
//! Centralized error handling using thiserror. The loop and traversal
//! operations are generic over the caller's own error type; `WhilrError`
//! covers the crate's own fallible surfaces (project metadata loading).

use thiserror::Error;

/// All error types that can occur in Whilr
#[derive(Debug, Error)]
pub enum WhilrError {
    /// IO error while reading a metadata file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata file is not valid UTF-8 or otherwise unreadable
    #[error("Metadata error: {0}")]
    Metadata(String),
}

/// Result type alias for Whilr operations
pub type Result<T> = std::result::Result<T, WhilrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WhilrError = io_err.into();
        assert!(matches!(err, WhilrError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_metadata_error_display() {
        let err = WhilrError::Metadata("bad encoding".to_string());
        assert_eq!(err.to_string(), "Metadata error: bad encoding");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        assert!(returns_ok().is_ok());
    }
}
