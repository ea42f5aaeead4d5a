//! Secure storage abstraction for secret key material.
//!
//! This module defines the [`SecureKeyStorage`] trait for platform-agnostic
//! secure storage of secret keys. Implementations are provided by the
//! platform layer (iOS Keychain, Android Keystore, Secret Service, ...).
//!
//! # Security
//!
//! - Secret bytes are never written by Rust code to any other location
//! - Entries are keyed by the hex public key they belong to
//! - Nothing stored here is ever serialized alongside the app state blobs

use super::error::VaultError;

/// Capability interface over the platform's secure credential store.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across threads.
pub trait SecureKeyStorage: Send + Sync {
    /// Retrieves the secret stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read (locked, denied, ...).
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), VaultError>;

    /// Deletes the secret stored under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    fn delete(&self, key: &str) -> Result<(), VaultError>;

    /// Lists every key currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list_keys(&self) -> Result<Vec<String>, VaultError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemorySecureStorage;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    use super::{SecureKeyStorage, VaultError};

    /// In-memory storage implementation for testing.
    ///
    /// This implementation is NOT secure and should only be used in tests.
    #[derive(Debug, Default)]
    pub struct MemorySecureStorage {
        data: RwLock<BTreeMap<String, Vec<u8>>>,
        locked: AtomicBool,
    }

    impl MemorySecureStorage {
        /// Creates a new empty storage.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulates a locked keychain: every operation fails while set.
        pub fn set_locked(&self, locked: bool) {
            self.locked.store(locked, Ordering::SeqCst);
        }

        fn check_unlocked(&self) -> Result<(), VaultError> {
            if self.locked.load(Ordering::SeqCst) {
                return Err(VaultError::Storage("storage is locked".to_string()));
            }
            Ok(())
        }
    }

    impl SecureKeyStorage for MemorySecureStorage {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
            self.check_unlocked()?;
            let data = self
                .data
                .read()
                .map_err(|e| VaultError::Storage(e.to_string()))?;
            Ok(data.get(key).cloned())
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), VaultError> {
            self.check_unlocked()?;
            let mut data = self
                .data
                .write()
                .map_err(|e| VaultError::Storage(e.to_string()))?;
            data.insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<(), VaultError> {
            self.check_unlocked()?;
            let mut data = self
                .data
                .write()
                .map_err(|e| VaultError::Storage(e.to_string()))?;
            data.remove(key);
            Ok(())
        }

        fn list_keys(&self) -> Result<Vec<String>, VaultError> {
            self.check_unlocked()?;
            let data = self
                .data
                .read()
                .map_err(|e| VaultError::Storage(e.to_string()))?;
            Ok(data.keys().cloned().collect())
        }
    }
}
