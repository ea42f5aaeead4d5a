//! Signing keypair held by the vault.
//!
//! # Security
//!
//! - Secret bytes are automatically zeroized on drop via [`ZeroizeOnDrop`]
//! - Temporary copies are manually zeroized after use
//! - Debug output never includes secret material

use nostr::prelude::{Keys, ToBech32};
use nostr::secp256k1::{Keypair, Message, SecretKey as Secp256k1SecretKey};
use nostr::SecretKey as NostrSecretKey;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::error::{VaultError, VaultResult};
use crate::nostr::{npub_from_hex, EventDraft, SignedEvent, SECP};

/// A Nostr keypair reconstructed from vault storage.
///
/// Instances only live for the duration of a vault operation; the vault
/// never hands them out.
#[derive(ZeroizeOnDrop)]
pub struct VaultKeypair {
    /// The secret key bytes (zeroized on drop).
    secret_bytes: [u8; 32],

    /// Cached public key bytes (not sensitive, skip zeroization).
    #[zeroize(skip)]
    pubkey_bytes: [u8; 32],
}

impl VaultKeypair {
    /// Generates a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let keys = Keys::generate();

        Self {
            secret_bytes: keys.secret_key().secret_bytes(),
            pubkey_bytes: keys.public_key().to_bytes(),
        }
    }

    /// Parses user-supplied secret material.
    ///
    /// Accepts a 64-character hex secret or an `nsec1` bech32 string.
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKeyFormat`] if the string is neither.
    pub fn parse(secret: &str) -> VaultResult<Self> {
        let keys = Keys::parse(secret.trim())
            .map_err(|e| VaultError::InvalidKeyFormat(e.to_string()))?;

        Ok(Self {
            secret_bytes: keys.secret_key().secret_bytes(),
            pubkey_bytes: keys.public_key().to_bytes(),
        })
    }

    /// Creates a keypair from raw secret key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes don't represent a valid secret key.
    pub fn from_secret_bytes(secret_bytes: [u8; 32]) -> VaultResult<Self> {
        let secret_key = Secp256k1SecretKey::from_slice(&secret_bytes)
            .map_err(|e| VaultError::InvalidKeyFormat(e.to_string()))?;

        let keypair = Keypair::from_secret_key(&SECP, &secret_key);
        let (public_key, _parity) = keypair.x_only_public_key();

        Ok(Self {
            secret_bytes,
            pubkey_bytes: public_key.serialize(),
        })
    }

    /// Exports the secret key as nsec (NIP-19 bech32 format).
    ///
    /// # Errors
    ///
    /// Returns an error if bech32 encoding fails.
    pub fn export_nsec(&self) -> VaultResult<Zeroizing<String>> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = NostrSecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| VaultError::InvalidKeyFormat(e.to_string()))?;

            secret_key
                .to_bech32()
                .map(Zeroizing::new)
                .map_err(|e| VaultError::Bech32(e.to_string()))
        })();

        secret_bytes_copy.zeroize();

        result
    }

    /// Returns the public key as a 64-character hex string.
    #[must_use]
    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.pubkey_bytes)
    }

    /// Returns the public key as npub (NIP-19 bech32 format).
    #[must_use]
    pub fn npub(&self) -> Option<String> {
        npub_from_hex(&self.pubkey_hex())
    }

    /// Signs a 32-byte message hash using a BIP-340 Schnorr signature.
    ///
    /// Returns the 64-byte signature as a 128-character hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored secret is unusable.
    pub fn sign(&self, message_hash: &[u8; 32]) -> VaultResult<String> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = Secp256k1SecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| VaultError::SigningUnavailable(e.to_string()))?;

            let keypair = Keypair::from_secret_key(&SECP, &secret_key);
            let message = Message::from_digest(*message_hash);
            let signature = SECP.sign_schnorr(&message, &keypair);

            Ok(hex::encode(signature.serialize()))
        })();

        secret_bytes_copy.zeroize();

        result
    }

    /// Finalizes and signs a draft with this key.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft names another author, carries a
    /// mismatching id, or signing fails.
    pub fn sign_draft(&self, draft: EventDraft, now: i64) -> VaultResult<SignedEvent> {
        let unsigned = draft.finalize(&self.pubkey_hex(), now)?;
        let sig = self.sign(&unsigned.id_bytes()?)?;
        Ok(unsigned.into_signed(sig))
    }

    /// Returns the raw secret key bytes for storage, wrapped in `Zeroizing`.
    #[must_use]
    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret_bytes)
    }
}

impl std::fmt::Debug for VaultKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret key
        f.debug_struct("VaultKeypair")
            .field("pubkey", &self.pubkey_hex())
            .finish()
    }
}
