//! Error types for the chat store.
//!
//! [`StoreError`] is the primary error type returned by all store
//! operations. It provides specific variants for common failure modes while
//! keeping the surface area small enough for exhaustive pattern matching.

use thiserror::Error;

/// Errors that can occur during chat store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested user was not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Requested conversation was not found.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// Requested message was not found.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Requested call was not found.
    #[error("call not found: {0}")]
    CallNotFound(String),

    /// A unique constraint was violated (e.g. duplicate username).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid operation on the store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
