//! Error types for key custody operations.

use thiserror::Error;

use crate::nostr::NostrError;

/// Errors that can occur in the key vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The supplied secret is neither 64-char hex nor a valid nsec.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// No secret is stored for the public key.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The secret exists but cannot be used right now.
    #[error("Signing unavailable: {0}")]
    SigningUnavailable(String),

    /// Secure storage operation failed.
    #[error("Secure storage error: {0}")]
    Storage(String),

    /// Building or signing the event failed.
    #[error("Event signing failed: {0}")]
    Signing(#[from] NostrError),

    /// Bech32 encoding failed.
    #[error("Bech32 encoding failed: {0}")]
    Bech32(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
