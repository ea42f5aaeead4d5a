//! Persistence backends for the app state blobs.
//!
//! App state is stored as a handful of JSON blobs, one per collection,
//! under a shared namespace. Secret key material never passes through
//! this module; see [`crate::vault`].

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{StateError, StateResult};

/// Blob key for the identity list.
pub const IDENTITIES_KEY: &str = "identities";

/// Blob key for the profile cache.
pub const PROFILES_KEY: &str = "profiles";

/// Blob key for the relay directory.
pub const RELAYS_KEY: &str = "relays";

/// Blob key for site sessions.
pub const SITE_SESSIONS_KEY: &str = "siteSessions";

/// Key-value store for serialized app state.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across threads.
pub trait KeyValueStore: Send + Sync {
    /// Loads the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing the previous blob.
    ///
    /// A failed save must leave the previous blob intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn save(&self, key: &str, value: &[u8]) -> StateResult<()>;
}

/// Stores each blob as `<base>/<namespace>/<key>.json`.
///
/// Writes go to a temporary file that is renamed over the target, so the
/// last successfully written snapshot always survives.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (and creates) the namespace directory under `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the namespace
    /// is not a single path component.
    pub fn open(base: impl AsRef<Path>, namespace: &str) -> StateResult<Self> {
        if !is_plain_name(namespace) {
            return Err(StateError::Storage(format!(
                "invalid storage namespace: {namespace}"
            )));
        }

        let dir = base.as_ref().join(namespace);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding this namespace's blobs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StateResult<PathBuf> {
        if !is_plain_name(key) {
            return Err(StateError::Storage(format!("invalid storage key: {key}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &[u8]) -> StateResult<()> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));

        fs::write(&tmp, value)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('.')
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    use super::{KeyValueStore, StateError, StateResult};

    /// In-memory store for tests.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        data: RwLock<BTreeMap<String, Vec<u8>>>,
        failing: AtomicBool,
    }

    impl MemoryStore {
        /// Creates an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every subsequent save fail while set.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Returns the raw blob under `key`.
        #[must_use]
        pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
            self.data.read().ok()?.get(key).cloned()
        }
    }

    impl KeyValueStore for MemoryStore {
        fn load(&self, key: &str) -> StateResult<Option<Vec<u8>>> {
            let data = self
                .data
                .read()
                .map_err(|e| StateError::Storage(e.to_string()))?;
            Ok(data.get(key).cloned())
        }

        fn save(&self, key: &str, value: &[u8]) -> StateResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StateError::Storage("simulated write failure".to_string()));
            }
            let mut data = self
                .data
                .write()
                .map_err(|e| StateError::Storage(e.to_string()))?;
            data.insert(key.to_string(), value.to_vec());
            Ok(())
        }
    }
}
