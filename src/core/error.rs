//! Error types for Cairn operations.
//!
//! This module defines the canonical error type used throughout Cairn.
//! All subsystems return `Result<T, CairnError>` for error handling.

use std::io;
use thiserror::Error;

/// Canonical error type for all Cairn operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Most variants auto-convert from standard library / serde errors via `#[from]`.
#[derive(Error, Debug)]
pub enum CairnError {
    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path resolved outside the workspace root, or used an absolute/`..` segment.
    #[error("Path error: {0}")]
    Path(String),

    /// A block, file, or proposal could not be located.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A proposal failed structural/enum/safety validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A gate (dedup, backlog, cooldown, no-touch) refused the apply attempt.
    #[error("Gate refused: {0}")]
    GateRefused(String),

    /// An op executor could not apply its mutation.
    #[error("Op failed: {0}")]
    OpFailed(String),

    /// A precondition or post-check subprocess reported failure, errored, or timed out.
    #[error("Precondition check failed: {0}")]
    PreconditionFailed(String),

    /// A block-structured text file could not be parsed as expected.
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = CairnError::Validation("test failed".to_string());
        assert_eq!(format!("{}", err), "Validation error: test failed");
    }

    #[test]
    fn not_found_error_display() {
        let err = CairnError::NotFound("P-20260101-001".to_string());
        assert_eq!(format!("{}", err), "Not found: P-20260101-001");
    }

    #[test]
    fn gate_refused_display() {
        let err = CairnError::GateRefused("No-touch window: 4m remaining".to_string());
        assert_eq!(
            format!("{}", err),
            "Gate refused: No-touch window: 4m remaining"
        );
    }

    #[test]
    fn path_error_display() {
        let err = CairnError::Path("traversal outside workspace root".to_string());
        assert_eq!(format!("{}", err), "Path error: traversal outside workspace root");
    }
}
