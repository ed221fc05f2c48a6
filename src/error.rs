//! Error types for the devsync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

use crate::model::EntityKind;
use crate::serializers::SerializeError;
use crate::storage::StoreError;
use crate::sync::SyncError;

/// Result type alias for devsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    EntityNotFound,
    SyncInactive,
    FileNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidRecord,

    // Permission (exit 5)
    PermissionDenied,

    // Sync (exit 6)
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::SyncInactive => "SYNC_INACTIVE",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidRecord => "INVALID_RECORD",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::EntityNotFound | Self::SyncInactive | Self::FileNotFound => 3,
            Self::InvalidArgument | Self::InvalidRecord => 4,
            Self::PermissionDenied => 5,
            Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller should retry with corrected input.
    ///
    /// True for validation errors and database errors (locked database).
    /// False for not-found, permission, I/O, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::InvalidRecord | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in devsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Sync is not active")]
    SyncInactive,

    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: EntityKind, id: String },

    #[error("Not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid record: {0}")]
    Serialize(#[from] SerializeError),

    #[error("Sync error: {0}")]
    Sync(SyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<SyncError> for Error {
    /// Lift the sync conditions callers act on into their own variants.
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Inactive => Self::SyncInactive,
            SyncError::PermissionDenied(path) => Self::PermissionDenied { path },
            SyncError::NotFound(path) => Self::FileNotFound(path),
            SyncError::Store(e) => Self::Store(e),
            SyncError::Serialize(e) => Self::Serialize(e),
            other => Self::Sync(other),
        }
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SyncInactive => ErrorCode::SyncInactive,
            Self::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            Self::FileNotFound(_) => ErrorCode::FileNotFound,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Database(_) | Self::Store(_) => ErrorCode::DatabaseError,
            Self::Serialize(_) => ErrorCode::InvalidRecord,
            Self::Sync(_) => ErrorCode::SyncError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::SyncInactive => Some(
                "No active sync root.\n  \
                 Start: devsync init <dir>\n  \
                 Check: devsync status"
                    .to_string(),
            ),

            Self::EntityNotFound { kind, id } => Some(format!(
                "No {kind} with ID '{id}'. Use `devsync entity list {kind}` to see available records."
            )),

            Self::PermissionDenied { path } => Some(format!(
                "Make sure '{path}' exists and is writable by the current user."
            )),

            Self::FileNotFound(path) if path.ends_with(".json.gz") => Some(
                "No snapshot has been written yet. Enable it with \
                 `devsync toggle full-export on` and run `devsync export`."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("category") {
                    Some(
                        "Valid categories: agents, conversations, memories, knowledge, tasks, \
                         studio, full-export"
                            .to_string(),
                    )
                } else if msg.contains("entity type") {
                    Some(
                        "Valid entity types: agent, conversation, memory, knowledge, task, studio"
                            .to_string(),
                    )
                } else {
                    None
                }
            }

            Self::Serialize(_) => Some(
                "Records are JSON objects tagged with their kind, e.g. \
                 {\"kind\":\"agent\",\"id\":\"a1\",...}"
                    .to_string(),
            ),

            Self::FileNotFound(_)
            | Self::Database(_)
            | Self::Store(_)
            | Self::Sync(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_errors_are_lifted() {
        let err = Error::from(SyncError::PermissionDenied("/ro".into()));
        assert_eq!(err.error_code(), ErrorCode::PermissionDenied);
        assert_eq!(err.exit_code(), 5);

        let err = Error::from(SyncError::Inactive);
        assert_eq!(err.error_code(), ErrorCode::SyncInactive);
        assert!(err.hint().unwrap().contains("devsync init"));

        let err = Error::from(SyncError::Decode("bad base64".into()));
        assert_eq!(err.error_code(), ErrorCode::SyncError);
    }

    #[test]
    fn test_structured_json() {
        let err = Error::EntityNotFound {
            kind: EntityKind::Agent,
            id: "a1".into(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "ENTITY_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert_eq!(json["error"]["retryable"], false);
        assert_eq!(json["error"]["message"], "agent not found: a1");
        assert!(json["error"]["hint"].as_str().unwrap().contains("entity list agent"));
    }

    #[test]
    fn test_category_hint() {
        let err = Error::InvalidArgument("unknown category: widgets".into());
        assert!(err.hint().unwrap().contains("full-export"));
        assert!(err.error_code().is_retryable());
    }
}
