//! Error types for the signing bridge.
//!
//! [`BridgeError`] is returned to the host for calls that cannot be routed
//! at all. Everything the web content sees is a [`RejectReason`] inside a
//! rejected reply.

use thiserror::Error;

use crate::state::StateError;
use crate::vault::VaultError;

/// Errors returned to the host by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Message name has no handler in the page.
    #[error("Unknown bridge method: {0}")]
    UnknownMethod(String),

    /// Message envelope is not `{name, body}`.
    #[error("Invalid bridge message: {0}")]
    InvalidMessage(String),

    /// Page URL has no host to key the request on.
    #[error("Invalid site URL: {0}")]
    InvalidSite(String),

    /// No pending request of the expected kind for this site.
    #[error("No pending {method} request for {site}")]
    NoPendingRequest {
        /// Site host.
        site: String,
        /// Expected request method.
        method: &'static str,
    },

    /// Selected key is not one of this device's identities.
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// Recording the exchange in app state failed.
    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Why a bridge request resolved without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectReason {
    /// The user declined.
    #[error("rejected by user")]
    UserRejected,

    /// Superseded by a newer request, dismissed, or the app went to background.
    #[error("request cancelled")]
    Cancelled,

    /// No identity exists to answer with.
    #[error("no identity available")]
    NoIdentity,

    /// The request body was malformed.
    #[error("invalid request")]
    InvalidRequest,

    /// The signer's secret key is missing from secure storage.
    #[error("signing key not found")]
    KeyNotFound,

    /// Secure storage could not be used.
    #[error("signing unavailable")]
    SigningUnavailable,

    /// Nobody answered the prompt in time.
    #[error("request timed out")]
    TimedOut,
}

impl From<&VaultError> for RejectReason {
    fn from(err: &VaultError) -> Self {
        match err {
            VaultError::KeyNotFound(_) => Self::KeyNotFound,
            VaultError::Signing(_) | VaultError::InvalidKeyFormat(_) => Self::InvalidRequest,
            VaultError::SigningUnavailable(_) | VaultError::Storage(_) | VaultError::Bech32(_) => {
                Self::SigningUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_method_display() {
        let err = BridgeError::UnknownMethod("encrypt".to_string());
        assert_eq!(err.to_string(), "Unknown bridge method: encrypt");
    }

    #[test]
    fn no_pending_display() {
        let err = BridgeError::NoPendingRequest {
            site: "a.example".to_string(),
            method: "signEvent",
        };
        assert_eq!(err.to_string(), "No pending signEvent request for a.example");
    }

    #[test]
    fn vault_errors_map_to_reasons() {
        assert_eq!(
            RejectReason::from(&VaultError::KeyNotFound("pk".to_string())),
            RejectReason::KeyNotFound
        );
        assert_eq!(
            RejectReason::from(&VaultError::SigningUnavailable("locked".to_string())),
            RejectReason::SigningUnavailable
        );
        assert_eq!(
            RejectReason::from(&VaultError::Storage("io".to_string())),
            RejectReason::SigningUnavailable
        );
    }
}
