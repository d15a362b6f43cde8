//! Error types for Durandal

use thiserror::Error;

/// Result type alias for Durandal operations
pub type Result<T> = std::result::Result<T, DurandalError>;

/// Main error type for Durandal
///
/// Every variant maps to a stable string code (`kind`), a JSON-RPC error
/// code, and a recovery hint suitable for display to the calling agent.
#[derive(Error, Debug)]
pub enum DurandalError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Memory not found: {0}")]
    NotFound(i64),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DurandalError {
    /// Convenience constructor for validation failures with a field path
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DurandalError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable string code for structured tool responses
    pub fn kind(&self) -> &'static str {
        match self {
            DurandalError::Validation { .. } => "ValidationError",
            DurandalError::NotFound(_) => "NotFound",
            DurandalError::StorageUnavailable(_) => "StorageUnavailable",
            DurandalError::Constraint(_) => "ConstraintViolation",
            DurandalError::Timeout(_) => "Timeout",
            DurandalError::Cancelled => "Cancelled",
            DurandalError::Protocol(_) => "ProtocolError",
            DurandalError::Serialization(_) | DurandalError::Io(_) | DurandalError::Internal(_) => {
                "Internal"
            }
        }
    }

    /// Get error code for the MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            DurandalError::NotFound(_) => -32001,
            DurandalError::Timeout(_) => -32003,
            DurandalError::Cancelled => -32004,
            DurandalError::Constraint(_) => -32005,
            DurandalError::Protocol(_) => -32600,
            DurandalError::Validation { .. } => -32602,
            _ => -32000,
        }
    }

    /// Recovery hint suitable for display alongside the message
    pub fn hint(&self) -> &'static str {
        match self {
            DurandalError::Validation { .. } => "check the argument against the tool's input schema",
            DurandalError::NotFound(_) => "verify the id exists via search_memories or get_context",
            DurandalError::StorageUnavailable(_) => "check DATABASE_PATH and its permissions",
            DurandalError::Constraint(_) => "use a different name or remove the conflicting row",
            DurandalError::Timeout(_) => "retry with a smaller limit",
            DurandalError::Cancelled => "retry the request",
            DurandalError::Protocol(_) => "send one JSON-RPC object per line",
            _ => "see the server log for details",
        }
    }
}

impl From<rusqlite::Error> for DurandalError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    DurandalError::Constraint(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::NotADatabase
                | rusqlite::ErrorCode::DatabaseCorrupt => {
                    DurandalError::StorageUnavailable(err.to_string())
                }
                _ => DurandalError::Internal(err.to_string()),
            },
            rusqlite::Error::QueryReturnedNoRows => DurandalError::NotFound(0),
            _ => DurandalError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(DurandalError::validation("content", "required").kind(), "ValidationError");
        assert_eq!(DurandalError::NotFound(7).kind(), "NotFound");
        assert_eq!(DurandalError::Cancelled.kind(), "Cancelled");
        assert_eq!(DurandalError::Internal("x".into()).kind(), "Internal");
    }

    #[test]
    fn validation_carries_field_path() {
        let err = DurandalError::validation("filters.minImportance", "must be within [0,1]");
        assert!(err.to_string().contains("filters.minImportance"));
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn every_kind_has_a_hint() {
        let errors = [
            DurandalError::validation("f", "m"),
            DurandalError::NotFound(1),
            DurandalError::StorageUnavailable("gone".into()),
            DurandalError::Constraint("dup".into()),
            DurandalError::Timeout("slow".into()),
            DurandalError::Cancelled,
            DurandalError::Protocol("bad".into()),
            DurandalError::Internal("boom".into()),
        ];
        for err in errors {
            assert!(!err.hint().is_empty());
        }
    }
}
