//! Error types for relay operations.
//!
//! This module defines error types that can occur during relay
//! communication. None of them are fatal to the app: a failing relay
//! falls back to `Disconnected` and is retried on the next explicit
//! connect.

use thiserror::Error;

/// Errors that can occur during relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection to relay failed.
    #[error("Failed to connect to relay {url}: {reason}")]
    Connection {
        /// The relay URL that failed.
        url: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The relay or the network closed an open connection.
    #[error("Connection to {url} closed: {reason}")]
    Closed {
        /// The relay URL.
        url: String,
        /// What closed it.
        reason: String,
    },

    /// Tried to send on a link without an open socket.
    #[error("Relay {0} is not connected")]
    NotConnected(String),

    /// No link exists for this relay.
    #[error("Unknown relay: {0}")]
    UnknownRelay(String),

    /// Inbound frame is not a relay protocol message.
    #[error("Invalid relay message: {0}")]
    InvalidMessage(String),

    /// Encoding an outbound message failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
