//! Top-level error type for [`KeistrCore`](crate::KeistrCore).

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::relay::RelayError;
use crate::state::StateError;
use crate::vault::VaultError;

/// Errors surfaced by the core facade.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key vault failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// App state failure.
    #[error(transparent)]
    State(#[from] StateError),

    /// Relay failure.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Bridge routing failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// External activation URL is not `<scheme>://?openUrl=<url>`.
    #[error("Invalid activation URL: {0}")]
    InvalidActivation(String),
}

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_module_errors_transparently() {
        let err: CoreError = VaultError::KeyNotFound("abc".to_string()).into();
        assert_eq!(err.to_string(), "Key not found: abc");

        let err: CoreError = StateError::InvalidRelayUrl("x".to_string()).into();
        assert!(matches!(err, CoreError::State(StateError::InvalidRelayUrl(_))));
    }

    #[test]
    fn invalid_activation_display() {
        let err = CoreError::InvalidActivation("keistr://".to_string());
        assert_eq!(err.to_string(), "Invalid activation URL: keistr://");
    }
}
