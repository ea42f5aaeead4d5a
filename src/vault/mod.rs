//! Key custody.
//!
//! The vault owns every secret key. Secrets are written to a host-provided
//! [`SecureKeyStorage`] keyed by hex public key and only ever leave it
//! as a signature, or as an nsec through the explicitly confirmed
//! [`KeyVault::reveal_secret`].
//!
//! # Security
//!
//! - Secret bytes are zeroized on drop and after every temporary use
//! - No `Debug` output includes secret material
//! - Secrets are never serialized with the app state blobs

mod error;
mod keypair;
mod manager;
mod storage;

pub use error::{VaultError, VaultResult};
pub use keypair::VaultKeypair;
pub use manager::{ImportedKey, KeyVault, RevealConfirmation};
pub use storage::SecureKeyStorage;

#[cfg(any(test, feature = "test-utils"))]
pub use storage::MemorySecureStorage;
