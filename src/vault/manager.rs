//! Key vault: the only component that touches secret key material.

use std::sync::Arc;

use zeroize::Zeroizing;

use super::error::{VaultError, VaultResult};
use super::keypair::VaultKeypair;
use super::storage::SecureKeyStorage;
use crate::nostr::{is_valid_public_key, EventDraft, SignedEvent};

/// Outcome of importing or generating a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedKey {
    /// Hex public key derived from the secret.
    pub public_key: String,
    /// Whether the key was already in the vault (nothing was written).
    pub already_present: bool,
}

/// Proof that the user explicitly confirmed revealing a secret key.
///
/// The host constructs this only after showing its own confirmation
/// prompt; [`KeyVault::reveal_secret`] refuses to run without it.
#[derive(Debug)]
pub struct RevealConfirmation {
    _private: (),
}

impl RevealConfirmation {
    /// Records that the user confirmed the reveal prompt.
    #[must_use]
    pub const fn user_confirmed() -> Self {
        Self { _private: () }
    }
}

/// Stores secret keys in secure storage and signs on their behalf.
///
/// Secrets are stored as 32 raw bytes keyed by the hex public key.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use keistr_core::vault::{KeyVault, MemorySecureStorage};
/// use keistr_core::nostr::EventDraft;
///
/// let vault = KeyVault::new(Arc::new(MemorySecureStorage::new()));
/// let key = vault.generate_key().unwrap();
/// let event = vault.sign(&key.public_key, EventDraft::new(1, vec![], "hi")).unwrap();
/// assert!(event.verify_signature().is_ok());
/// ```
#[derive(Clone)]
pub struct KeyVault {
    storage: Arc<dyn SecureKeyStorage>,
}

impl KeyVault {
    /// Creates a vault backed by the given secure storage.
    #[must_use]
    pub fn new(storage: Arc<dyn SecureKeyStorage>) -> Self {
        Self { storage }
    }

    /// Imports a hex or nsec secret key.
    ///
    /// Importing a key that is already stored is not an error; the result
    /// reports `already_present` and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKeyFormat`] for malformed input and
    /// [`VaultError::Storage`] if secure storage fails.
    pub fn import_key(&self, secret: &str) -> VaultResult<ImportedKey> {
        let keypair = VaultKeypair::parse(secret)?;
        self.store(&keypair)
    }

    /// Generates and stores a fresh key.
    ///
    /// # Errors
    ///
    /// Returns an error if secure storage fails.
    pub fn generate_key(&self) -> VaultResult<ImportedKey> {
        self.store(&VaultKeypair::generate())
    }

    fn store(&self, keypair: &VaultKeypair) -> VaultResult<ImportedKey> {
        let public_key = keypair.pubkey_hex();

        if self.storage.get(&public_key)?.is_some() {
            return Ok(ImportedKey {
                public_key,
                already_present: true,
            });
        }

        self.storage.set(&public_key, keypair.secret_bytes().as_ref())?;
        log::info!("Stored signing key {public_key}");

        Ok(ImportedKey {
            public_key,
            already_present: false,
        })
    }

    /// Signs `draft` with the key for `public_key`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::KeyNotFound`] if no secret is stored for the key
    /// - [`VaultError::SigningUnavailable`] if storage cannot be read or the
    ///   stored material is corrupt
    /// - [`VaultError::Signing`] if the draft cannot be signed by this key
    pub fn sign(&self, public_key: &str, draft: EventDraft) -> VaultResult<SignedEvent> {
        let keypair = self.load(public_key)?;
        keypair.sign_draft(draft, chrono::Utc::now().timestamp())
    }

    /// Reveals the nsec for `public_key` after explicit user confirmation.
    ///
    /// # Errors
    ///
    /// Same lookup errors as [`Self::sign`].
    pub fn reveal_secret(
        &self,
        public_key: &str,
        _confirmation: RevealConfirmation,
    ) -> VaultResult<Zeroizing<String>> {
        log::info!("Revealing secret key for {public_key} after user confirmation");
        self.load(public_key)?.export_nsec()
    }

    /// Deletes the secret for `public_key`. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if secure storage fails.
    pub fn delete_key(&self, public_key: &str) -> VaultResult<()> {
        self.storage.delete(public_key)
    }

    /// Returns whether a secret is stored for `public_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if secure storage fails.
    pub fn contains(&self, public_key: &str) -> VaultResult<bool> {
        Ok(self.storage.get(public_key)?.is_some())
    }

    /// Lists the public keys of every secret in storage.
    ///
    /// Entries whose key is not a valid public key are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if secure storage cannot be enumerated.
    pub fn stored_public_keys(&self) -> VaultResult<Vec<String>> {
        Ok(self
            .storage
            .list_keys()?
            .into_iter()
            .filter(|key| is_valid_public_key(key))
            .collect())
    }

    fn load(&self, public_key: &str) -> VaultResult<VaultKeypair> {
        let stored = self
            .storage
            .get(public_key)
            .map_err(|e| VaultError::SigningUnavailable(e.to_string()))?
            .ok_or_else(|| VaultError::KeyNotFound(public_key.to_string()))?;

        let mut bytes = Zeroizing::new([0u8; 32]);
        if stored.len() != bytes.len() {
            return Err(VaultError::SigningUnavailable(format!(
                "stored secret for {public_key} has unexpected length"
            )));
        }
        bytes.copy_from_slice(&stored);
        drop(Zeroizing::new(stored));

        let keypair = VaultKeypair::from_secret_bytes(*bytes)
            .map_err(|e| VaultError::SigningUnavailable(e.to_string()))?;

        if keypair.pubkey_hex() != public_key.to_ascii_lowercase() {
            return Err(VaultError::SigningUnavailable(format!(
                "stored secret does not belong to {public_key}"
            )));
        }

        Ok(keypair)
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault").finish_non_exhaustive()
    }
}
