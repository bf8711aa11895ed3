//! Error types for the Kingstone server
//!
//! ## Table of Contents
//! - **ServerError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, ServerError>`

use thiserror::Error;

/// Result type alias for Kingstone operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Main error type for Kingstone operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error during startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Networking failure (bind, accept, write)
    #[error("network error: {0}")]
    Network(String),

    /// Malformed or unparseable client message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Client asked for an operation it has no authority over
    #[error("authority violation: {0}")]
    Authority(String),

    /// Referenced stone, tower or player does not exist
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Session bookkeeping failure
    #[error("session error: {0}")]
    Session(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (should not occur in normal operation)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an authority violation error
    pub fn authority(msg: impl Into<String>) -> Self {
        Self::Authority(msg.into())
    }

    /// Create an unknown-entity error
    pub fn unknown_entity(msg: impl Into<String>) -> Self {
        Self::UnknownEntity(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// True for the rejection classes that are logged and dropped without
    /// terminating the connection. Rejected intents are answered with
    /// silence, not an error reply.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Authority(_) | Self::UnknownEntity(_) | Self::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classes() {
        assert!(ServerError::authority("not the holder").is_rejection());
        assert!(ServerError::unknown_entity("stone-9").is_rejection());
        assert!(!ServerError::network("bind failed").is_rejection());
    }

    #[test]
    fn test_display() {
        let err = ServerError::unknown_entity("tower-3");
        assert_eq!(err.to_string(), "unknown entity: tower-3");
    }
}
