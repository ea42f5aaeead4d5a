//! Shared secp256k1 context and public key helpers.

use std::sync::LazyLock;

use nostr::prelude::{PublicKey, ToBech32};
use nostr::secp256k1::{Secp256k1, XOnlyPublicKey};

use crate::nostr::error::{NostrError, Result};

/// Global secp256k1 context for cryptographic operations.
///
/// Creating a `Secp256k1` context is expensive as it precomputes tables
/// for signing and verification. This shared context is initialized once
/// and reused across all operations.
pub static SECP: LazyLock<Secp256k1<nostr::secp256k1::All>> = LazyLock::new(Secp256k1::new);

/// Parses a 64-character hex public key into an x-only secp256k1 key.
///
/// # Errors
///
/// Returns an error if the string is not 32 bytes of hex or is not a
/// point on the curve.
pub fn parse_public_key(hex_key: &str) -> Result<XOnlyPublicKey> {
    let bytes: [u8; 32] = hex::decode(hex_key)?
        .try_into()
        .map_err(|_| NostrError::InvalidPublicKey(format!("wrong length: {hex_key}")))?;
    XOnlyPublicKey::from_slice(&bytes).map_err(|e| NostrError::InvalidPublicKey(e.to_string()))
}

/// Returns whether `hex_key` is a well-formed public key.
#[must_use]
pub fn is_valid_public_key(hex_key: &str) -> bool {
    parse_public_key(hex_key).is_ok()
}

/// Encodes a hex public key as npub (NIP-19).
///
/// Returns `None` when the key is malformed.
#[must_use]
pub fn npub_from_hex(hex_key: &str) -> Option<String> {
    let bytes = hex::decode(hex_key).ok()?;
    PublicKey::from_slice(&bytes).ok()?.to_bech32().ok()
}
