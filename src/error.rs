//! Error types for the toolkit.
//!
//! This module defines all error types that can occur while parsing a PDF,
//! generating names, planning, and applying modifications.

/// Result type alias for toolkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Malformed PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Document is encrypted and could not be decrypted
    #[error("Cannot decrypt document: {0}")]
    Encrypted(String),

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded while resolving references
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// Training store could not be loaded
    #[error("Training data corrupt: {0}")]
    TrainingCorrupt(String),

    /// A generated name violates the BEM grammar
    #[error("Name grammar violation: {0}")]
    NameGrammar(String),

    /// Planning found an unresolvable blocker; no mutation attempted
    #[error("Plan blocker: {0}")]
    PlanBlocker(String),

    /// Post-apply validation failed; the output was rolled back
    #[error("Validation failed after apply: {reason} (fields: {field_ids:?})")]
    ValidationFailed {
        /// What the validation pass detected
        reason: String,
        /// Field ids implicated in the failure
        field_ids: Vec<String>,
    },

    /// Backup could not be written; no mutation attempted
    #[error("Backup failure: {0}")]
    BackupFailure(String),

    /// Per-document time budget exceeded
    #[error("Time budget of {budget_secs}s exceeded during {stage}")]
    Timeout {
        /// Configured budget in seconds
        budget_secs: u64,
        /// Stage that was running when the budget expired
        stage: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error
    #[error("UTF-8 decoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl Error {
    /// Whether this error leaves the input file untouched.
    ///
    /// Every error except [`Error::ValidationFailed`] is raised either before
    /// any mutation is staged or after a completed rollback, so the source
    /// bytes are intact. `ValidationFailed` also implies a rollback ran, but
    /// callers should consult the integrity report it accompanies.
    pub fn input_unmodified(&self) -> bool {
        !matches!(self, Error::ValidationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("NotAPDF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("NotAPDF"));
    }

    #[test]
    fn test_parse_error() {
        let err = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        let msg = format!("{}", err);
        assert!(msg.contains("10 0 R"));
    }

    #[test]
    fn test_timeout_error() {
        let err = Error::Timeout {
            budget_secs: 120,
            stage: "apply".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("120"));
        assert!(msg.contains("apply"));
    }

    #[test]
    fn test_validation_failed_reports_fields() {
        let err = Error::ValidationFailed {
            reason: "name mismatch".to_string(),
            field_ids: vec!["field_0001".to_string()],
        };
        assert!(format!("{}", err).contains("field_0001"));
        assert!(!err.input_unmodified());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
