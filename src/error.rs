//! Error taxonomy for the document library.
//!
//! File-level failures ([`LibraryError::UnsupportedFormat`],
//! [`LibraryError::ExtractionFailure`]) are absorbed by the index builder and
//! only logged. Everything else aborts the request or build it occurs in and
//! maps to a distinguishing HTTP status via [`LibraryError::status_code`].

use axum::http::StatusCode;
use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed for {file}: {reason}")]
    ExtractionFailure { file: String, reason: String },

    #[error("search index not found; build it first")]
    IndexNotFound,

    #[error("build metadata not found")]
    MetadataNotFound,

    #[error("storage upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("an index build is already running (run {0})")]
    BuildInProgress(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LibraryError {
    /// HTTP status used when the error reaches the API surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            LibraryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LibraryError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            LibraryError::ExtractionFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LibraryError::IndexNotFound | LibraryError::MetadataNotFound => StatusCode::NOT_FOUND,
            LibraryError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            LibraryError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            LibraryError::BuildInProgress(_) => StatusCode::CONFLICT,
            LibraryError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            LibraryError::Unauthorized(_) => "unauthorized",
            LibraryError::UnsupportedFormat(_) => "unsupported_format",
            LibraryError::ExtractionFailure { .. } => "extraction_failure",
            LibraryError::IndexNotFound => "index_not_found",
            LibraryError::MetadataNotFound => "metadata_not_found",
            LibraryError::UpstreamUnavailable(_) => "upstream_unavailable",
            LibraryError::InvalidQuery(_) => "bad_request",
            LibraryError::BuildInProgress(_) => "build_in_progress",
            LibraryError::Serialization(_) => "internal",
        }
    }

    /// True for failures that only concern a single source file.
    pub fn is_file_level(&self) -> bool {
        matches!(
            self,
            LibraryError::UnsupportedFormat(_) | LibraryError::ExtractionFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_index_and_metadata_are_not_found() {
        assert_eq!(LibraryError::IndexNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            LibraryError::MetadataNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn upstream_and_auth_are_distinct() {
        let up = LibraryError::UpstreamUnavailable("connection refused".into());
        let auth = LibraryError::Unauthorized("token expired".into());
        assert_ne!(up.status_code(), auth.status_code());
        assert!(!up.is_file_level());
        assert!(!auth.is_file_level());
    }

    #[test]
    fn file_level_errors() {
        let e = LibraryError::ExtractionFailure {
            file: "a.pdf".into(),
            reason: "bad xref".into(),
        };
        assert!(e.is_file_level());
        assert!(e.to_string().contains("a.pdf"));
        assert!(LibraryError::UnsupportedFormat("text/plain".into()).is_file_level());
    }
}
