//! Error types for session store operations.

use crate::id::SessionId;

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fresh session identifier could not be produced.
    ///
    /// Raised only by `create`; no session is created when this happens.
    #[error("Failed to generate session identifier: {0}")]
    IdentifierGeneration(String),

    /// Session is not (or no longer) present in the store.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Store configuration was rejected at construction.
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// The background reclaimer could not be started.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
