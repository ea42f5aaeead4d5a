//! Error types for the persisted data model.

use thiserror::Error;

/// Errors that can occur while mutating or persisting app state.
#[derive(Error, Debug)]
pub enum StateError {
    /// Relay URL is not a ws:// or wss:// URL.
    #[error("Invalid relay URL: {0}")]
    InvalidRelayUrl(String),

    /// Site URL has no host to anchor a session on.
    #[error("Invalid site URL: {0}")]
    InvalidSiteUrl(String),

    /// Public key is not 32 bytes of hex.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// No identity with this public key.
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// No relay with this URL in the directory.
    #[error("Relay not found: {0}")]
    RelayNotFound(String),

    /// No site session for this host.
    #[error("Site session not found: {0}")]
    SessionNotFound(String),

    /// Persistence backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encoding or decoding a collection failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for state operations.
pub type StateResult<T> = std::result::Result<T, StateError>;

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
