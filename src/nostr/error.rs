//! Error types for Nostr event handling.

use thiserror::Error;

/// Errors that can occur while building, validating or verifying events.
#[derive(Error, Debug)]
pub enum NostrError {
    /// Serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid event structure or content.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A signing draft is missing a mandatory field or has the wrong shape.
    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    /// The draft names a different author than the signing key.
    #[error("Draft pubkey {draft} does not match signer {signer}")]
    PubkeyMismatch {
        /// Pubkey carried by the draft.
        draft: String,
        /// Pubkey of the key asked to sign.
        signer: String,
    },

    /// Event signature verification failed.
    #[error("Invalid event signature")]
    InvalidSignature,

    /// Invalid public key.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Hex encoding/decoding error.
    #[error("Hex encoding error: {0}")]
    HexError(String),
}

/// Result type for Nostr operations.
pub type Result<T> = std::result::Result<T, NostrError>;

impl From<hex::FromHexError> for NostrError {
    fn from(e: hex::FromHexError) -> Self {
        Self::HexError(e.to_string())
    }
}
