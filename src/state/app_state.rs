//! Single owner of every persisted collection.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use super::error::{StateError, StateResult};
use super::profiles::{IdentityStore, ProfileMetadata};
use super::storage::{
    KeyValueStore, IDENTITIES_KEY, PROFILES_KEY, RELAYS_KEY, SITE_SESSIONS_KEY,
};
use super::types::{Identity, RelayPermission, RelayPolicy, RelayRecord, SiteSession, StateChange};
use crate::nostr::is_valid_public_key;

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Identities, relays, profiles and site sessions.
///
/// `AppState` is the only writer of these collections. Readers get shared
/// references and can [`subscribe`](Self::subscribe) to change
/// notifications. Persistence is best effort: failures are logged and the
/// in-memory state stays authoritative.
pub struct AppState {
    pub(super) identities: Vec<Identity>,
    pub(super) relays: Vec<RelayRecord>,
    pub(super) profiles: IdentityStore,
    pub(super) sessions: Vec<SiteSession>,
    pub(super) active_session: Option<String>,
    store: Arc<dyn KeyValueStore>,
    changes: broadcast::Sender<StateChange>,
}

impl AppState {
    /// Creates an empty state persisted to `store`. Nothing is loaded yet.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            identities: Vec::new(),
            relays: Vec::new(),
            profiles: IdentityStore::new(),
            sessions: Vec::new(),
            active_session: None,
            store,
            changes,
        }
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub(super) fn notify(&self, change: StateChange) {
        // No receivers is fine
        let _ = self.changes.send(change);
    }

    /// Replaces the in-memory collections with the stored ones.
    ///
    /// A blob that is missing or fails to decode leaves that collection
    /// unchanged. Invariants are re-established afterwards.
    pub fn load(&mut self) {
        if let Some(identities) = self.load_blob::<Vec<Identity>>(IDENTITIES_KEY) {
            self.identities = identities;
        }
        if let Some(relays) = self.load_blob::<Vec<RelayRecord>>(RELAYS_KEY) {
            self.relays = relays;
        }
        if let Some(profiles) = self.load_blob::<IdentityStore>(PROFILES_KEY) {
            self.profiles = profiles;
        }
        if let Some(sessions) = self.load_blob::<Vec<SiteSession>>(SITE_SESSIONS_KEY) {
            self.sessions = sessions;
        }

        self.repair();
        log::info!(
            "Loaded {} identities, {} relays, {} site sessions",
            self.identities.len(),
            self.relays.len(),
            self.sessions.len()
        );
        self.notify(StateChange::Reloaded);
    }

    /// Writes every collection to the store.
    ///
    /// Returns whether all writes succeeded. Failed writes are logged and
    /// leave the previous snapshot in place.
    pub fn save(&self) -> bool {
        let results = [
            self.save_blob(IDENTITIES_KEY, &self.identities),
            self.save_blob(RELAYS_KEY, &self.relays),
            self.save_blob(PROFILES_KEY, &self.profiles),
            self.save_blob(SITE_SESSIONS_KEY, &self.sessions),
        ];
        results.iter().all(|ok| *ok)
    }

    fn load_blob<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.load(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Failed to load {key}: {e}");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Discarding unreadable {key} blob: {e}");
                None
            }
        }
    }

    fn save_blob<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let result = serde_json::to_vec(value)
            .map_err(StateError::from)
            .and_then(|bytes| self.store.save(key, &bytes));

        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to save {key}: {e}");
                false
            }
        }
    }

    /// Restores invariants after loading data written by an older build
    /// or a partially failed save.
    fn repair(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.identities
            .retain(|identity| seen.insert(identity.public_key.clone()));

        let mut seen_relays = std::collections::HashSet::new();
        self.relays.retain(|relay| seen_relays.insert(relay.url.clone()));

        let relay_urls: std::collections::HashSet<&str> =
            self.relays.iter().map(|relay| relay.url.as_str()).collect();
        for identity in &mut self.identities {
            identity
                .relay_permissions
                .retain(|relay_id, _| relay_urls.contains(relay_id.as_str()));
        }

        self.normalize_default();

        for identity in &self.identities {
            self.profiles.ensure(&identity.public_key);
        }
    }

    /// Makes exactly one identity default when any exist.
    fn normalize_default(&mut self) {
        let mut found = false;
        for identity in &mut self.identities {
            if identity.default_flag && !found {
                found = true;
            } else {
                identity.default_flag = false;
            }
        }
        if !found {
            if let Some(first) = self.identities.first_mut() {
                first.default_flag = true;
            }
        }
    }

    /// All identities in insertion order.
    #[must_use]
    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Returns the identity for `public_key`.
    #[must_use]
    pub fn identity(&self, public_key: &str) -> Option<&Identity> {
        self.identities
            .iter()
            .find(|identity| identity.public_key.eq_ignore_ascii_case(public_key))
    }

    /// Returns the default identity.
    #[must_use]
    pub fn default_identity(&self) -> Option<&Identity> {
        self.identities.iter().find(|identity| identity.default_flag)
    }

    /// Adds an identity for `public_key`.
    ///
    /// The first identity becomes default. The new identity gets read-only
    /// permission for every known relay and a placeholder profile. Returns
    /// `false` if the identity already existed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPublicKey`] if `public_key` is malformed.
    pub fn add_identity(&mut self, public_key: &str) -> StateResult<bool> {
        if !is_valid_public_key(public_key) {
            return Err(StateError::InvalidPublicKey(public_key.to_string()));
        }
        if self.identity(public_key).is_some() {
            return Ok(false);
        }

        let public_key = public_key.to_ascii_lowercase();
        let mut identity = Identity::new(public_key.clone());
        identity.default_flag = self.identities.is_empty();
        for relay in &self.relays {
            identity.relay_permissions.insert(
                relay.url.clone(),
                RelayPermission::new(relay.url.clone(), RelayPolicy::READ_ONLY),
            );
        }

        self.identities.push(identity);
        self.profiles.ensure(&public_key);

        log::info!("Added identity {public_key}");
        self.notify(StateChange::Identities);
        self.notify(StateChange::Profiles);
        Ok(true)
    }

    /// Removes the identity for `public_key`.
    ///
    /// Its profile and every site binding to it are removed too. If it was
    /// the default, the first remaining identity becomes default.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdentityNotFound`] if no such identity exists.
    pub fn remove_identity(&mut self, public_key: &str) -> StateResult<Identity> {
        let index = self
            .identities
            .iter()
            .position(|identity| identity.public_key.eq_ignore_ascii_case(public_key))
            .ok_or_else(|| StateError::IdentityNotFound(public_key.to_string()))?;

        let removed = self.identities.remove(index);
        if removed.default_flag {
            if let Some(first) = self.identities.first_mut() {
                first.default_flag = true;
            }
        }

        self.profiles.remove(&removed.public_key);

        let mut sessions_changed = false;
        for session in &mut self.sessions {
            if session.bound_public_key.as_deref() == Some(removed.public_key.as_str()) {
                session.bound_public_key = None;
                sessions_changed = true;
            }
        }

        log::info!("Removed identity {}", removed.public_key);
        self.notify(StateChange::Identities);
        self.notify(StateChange::Profiles);
        if sessions_changed {
            self.notify(StateChange::Sessions);
        }
        Ok(removed)
    }

    /// Makes `public_key` the default identity.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdentityNotFound`] if no such identity exists.
    pub fn set_default_identity(&mut self, public_key: &str) -> StateResult<()> {
        if self.identity(public_key).is_none() {
            return Err(StateError::IdentityNotFound(public_key.to_string()));
        }
        for identity in &mut self.identities {
            identity.default_flag = identity.public_key.eq_ignore_ascii_case(public_key);
        }
        self.notify(StateChange::Identities);
        Ok(())
    }

    /// Cached profiles.
    #[must_use]
    pub const fn profiles(&self) -> &IdentityStore {
        &self.profiles
    }

    /// Returns the cached profile for `public_key`.
    #[must_use]
    pub fn profile(&self, public_key: &str) -> Option<&ProfileMetadata> {
        self.profiles.get(public_key)
    }

    /// Merges a profile received from a relay.
    ///
    /// Profiles for keys that are not identities of this device are ignored.
    /// Returns whether the cache changed.
    pub fn apply_profile(&mut self, profile: ProfileMetadata) -> bool {
        if self.identity(&profile.public_key).is_none() {
            return false;
        }
        let changed = self.profiles.merge(profile);
        if changed {
            self.notify(StateChange::Profiles);
        }
        changed
    }

    /// Identity that signs for `host`: the one bound to the site, else the default.
    #[must_use]
    pub fn signer_for_site(&self, host: &str) -> Option<&Identity> {
        self.bound_identity(host)
            .and_then(|public_key| self.identity(public_key))
            .or_else(|| self.default_identity())
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("identities", &self.identities.len())
            .field("relays", &self.relays.len())
            .field("profiles", &self.profiles.len())
            .field("sessions", &self.sessions.len())
            .field("active_session", &self.active_session)
            .finish_non_exhaustive()
    }
}
