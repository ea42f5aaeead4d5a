//! Persisted data model.
//!
//! [`AppState`] owns identities, the relay directory, cached profiles and
//! site sessions. It is the single writer of all of them; other components
//! read through shared references and learn about changes by subscribing
//! to [`StateChange`] notifications.
//!
//! Collections are persisted as JSON blobs through a [`KeyValueStore`].

mod app_state;
mod directory;
mod error;
mod profiles;
mod sessions;
mod storage;
mod types;

pub use app_state::AppState;
pub use error::{StateError, StateResult};
pub use profiles::{IdentityStore, ProfileMetadata};
pub use storage::{
    FileStore, KeyValueStore, IDENTITIES_KEY, PROFILES_KEY, RELAYS_KEY, SITE_SESSIONS_KEY,
};
pub use types::{
    site_host, validate_relay_url, Identity, RelayPermission, RelayPolicy, RelayRecord,
    SiteSession, StateChange, BOOTSTRAP_RELAYS,
};

#[cfg(any(test, feature = "test-utils"))]
pub use storage::MemoryStore;
