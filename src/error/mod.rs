//! Error types for `beadstore`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration at the boundaries
//! - Maps every error onto the exit-code contract consumed by external
//!   tooling (0 ok, 1 user error, 2 integrity error, 3 staleness)

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `beadstore` operations.
#[derive(Error, Debug)]
pub enum BeadsError {
    // === Lookup errors ===
    /// An issue, wisp, or federation peer was not found.
    #[error("not found: {entity}")]
    NotFound { entity: String },

    // === Validation errors ===
    /// Field or identifier validation failed.
    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Issue ID format is invalid.
    #[error("invalid issue ID format: {id}")]
    InvalidId { id: String },

    /// Invalid status value.
    #[error("invalid status: {status}")]
    InvalidStatus { status: String },

    /// Invalid issue type value.
    #[error("invalid issue type: {issue_type}")]
    InvalidType { issue_type: String },

    /// Priority out of valid range (0-3).
    #[error("priority must be 0-3, got: {priority}")]
    InvalidPriority { priority: i32 },

    // === Graph errors ===
    /// Adding the dependency would create a cycle in the blocks subgraph.
    #[error("dependency cycle detected: {path}")]
    Cycle { path: String },

    /// Self-referential dependency.
    #[error("issue cannot depend on itself: {id}")]
    SelfDependency { id: String },

    // === Credential errors ===
    /// AEAD encryption or decryption failed (tag mismatch, truncation).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The credential key file could not be created or written.
    #[error("credential key I/O error at '{path}': {reason}")]
    KeyIo { path: PathBuf, reason: String },

    // === Sync errors ===
    /// The external JSONL export changed underneath the database.
    #[error("database is stale: {0}")]
    Stale(String),

    /// A multi-statement transaction could not be completed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A remote/federation primitive failed; carries peer context.
    #[error("remote error for peer '{peer}': {message}")]
    Remote { peer: String, message: String },

    // === Wrapped errors ===
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped anyhow error for boundary integrations.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeadsError {
    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error with entity context.
    #[must_use]
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Exit code consumed by external tooling.
    ///
    /// 0 is success (never produced by an error), 1 user error,
    /// 2 integrity error, 3 staleness error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Stale(_) => 3,
            Self::Cycle { .. } | Self::Transaction(_) | Self::Database(_) => 2,
            _ => 1,
        }
    }

    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation { .. }
                | Self::InvalidId { .. }
                | Self::InvalidStatus { .. }
                | Self::InvalidType { .. }
                | Self::InvalidPriority { .. }
                | Self::SelfDependency { .. }
        )
    }
}

/// Result type using `BeadsError`.
pub type Result<T> = std::result::Result<T, BeadsError>;
