//! Relay directory and per-identity relay permissions.

use super::app_state::AppState;
use super::error::{StateError, StateResult};
use super::types::{RelayPermission, RelayPolicy, RelayRecord, StateChange};

impl AppState {
    /// Known relays, most recently added first.
    #[must_use]
    pub fn relays(&self) -> &[RelayRecord] {
        &self.relays
    }

    /// Returns the relay record for `url`.
    #[must_use]
    pub fn relay(&self, url: &str) -> Option<&RelayRecord> {
        let url = url.trim();
        self.relays.iter().find(|relay| relay.url == url)
    }

    /// URLs of every known relay.
    #[must_use]
    pub fn relay_urls(&self) -> Vec<String> {
        self.relays.iter().map(|relay| relay.url.clone()).collect()
    }

    /// Adds a relay to the directory.
    ///
    /// Every identity without a permission for the relay is granted
    /// read-only access. Returns `false` if the relay was already known.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidRelayUrl`] if `url` is not a socket URL.
    pub fn add_relay(&mut self, url: &str) -> StateResult<bool> {
        let record = RelayRecord::new(url)?;
        if self.relay(&record.url).is_some() {
            return Ok(false);
        }

        for identity in &mut self.identities {
            identity
                .relay_permissions
                .entry(record.url.clone())
                .or_insert_with(|| RelayPermission::new(record.url.clone(), RelayPolicy::READ_ONLY));
        }

        log::info!("Added relay {}", record.url);
        self.relays.insert(0, record);
        self.notify(StateChange::Relays);
        self.notify(StateChange::Identities);
        Ok(true)
    }

    /// Removes a relay and every permission referencing it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::RelayNotFound`] if the relay is unknown.
    pub fn remove_relay(&mut self, url: &str) -> StateResult<RelayRecord> {
        let url = url.trim();
        let index = self
            .relays
            .iter()
            .position(|relay| relay.url == url)
            .ok_or_else(|| StateError::RelayNotFound(url.to_string()))?;

        let removed = self.relays.remove(index);
        for identity in &mut self.identities {
            identity.relay_permissions.remove(&removed.url);
        }

        log::info!("Removed relay {}", removed.url);
        self.notify(StateChange::Relays);
        self.notify(StateChange::Identities);
        Ok(removed)
    }

    /// Sets the permission of `public_key` for `relay_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdentityNotFound`] or
    /// [`StateError::RelayNotFound`] if either side is unknown.
    pub fn grant_permission(
        &mut self,
        public_key: &str,
        relay_url: &str,
        write: bool,
        read: bool,
    ) -> StateResult<()> {
        let relay_url = self
            .relay(relay_url)
            .map(|relay| relay.url.clone())
            .ok_or_else(|| StateError::RelayNotFound(relay_url.to_string()))?;

        let identity = self
            .identities
            .iter_mut()
            .find(|identity| identity.public_key.eq_ignore_ascii_case(public_key))
            .ok_or_else(|| StateError::IdentityNotFound(public_key.to_string()))?;

        identity.relay_permissions.insert(
            relay_url.clone(),
            RelayPermission::new(relay_url, RelayPolicy { write, read }),
        );
        self.notify(StateChange::Identities);
        Ok(())
    }

    /// Removes the permission of `public_key` for `relay_url`.
    ///
    /// Returns whether a permission existed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdentityNotFound`] if the identity is unknown.
    pub fn revoke_permission(&mut self, public_key: &str, relay_url: &str) -> StateResult<bool> {
        let identity = self
            .identities
            .iter_mut()
            .find(|identity| identity.public_key.eq_ignore_ascii_case(public_key))
            .ok_or_else(|| StateError::IdentityNotFound(public_key.to_string()))?;

        let removed = identity.relay_permissions.remove(relay_url.trim()).is_some();
        if removed {
            self.notify(StateChange::Identities);
        }
        Ok(removed)
    }

    /// Public keys whose profiles `relay_url` may be asked for.
    #[must_use]
    pub fn readers_for(&self, relay_url: &str) -> Vec<String> {
        let relay_url = relay_url.trim();
        self.identities
            .iter()
            .filter(|identity| identity.can_read(relay_url))
            .map(|identity| identity.public_key.clone())
            .collect()
    }

    /// Seeds `urls` into an empty directory.
    ///
    /// Does nothing once any relay is known. Invalid URLs are skipped.
    /// Returns how many relays were added.
    pub fn seed_bootstrap_relays(&mut self, urls: &[String]) -> usize {
        if !self.relays.is_empty() {
            return 0;
        }

        // Reverse so the first configured relay ends up first
        let mut added = 0;
        for url in urls.iter().rev() {
            match self.add_relay(url) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Skipping bootstrap relay: {e}"),
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::MemoryStore;
    use crate::vault::VaultKeypair;

    fn state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()))
    }

    fn key() -> String {
        VaultKeypair::generate().pubkey_hex()
    }

    #[test]
    fn add_relay_grants_read_only_to_existing_identities() {
        let mut state = state();
        let (p1, p2) = (key(), key());
        state.add_identity(&p1).unwrap();
        state.add_identity(&p2).unwrap();

        state.add_relay("wss://a").unwrap();
        state.add_relay("wss://b").unwrap();

        for pk in [&p1, &p2] {
            let identity = state.identity(pk).unwrap();
            let permission = identity.permission("wss://b").unwrap();
            assert!(permission.read);
            assert!(!permission.write);
        }
    }

    #[test]
    fn add_relay_inserts_at_front_and_ignores_duplicates() {
        let mut state = state();
        assert!(state.add_relay("wss://a").unwrap());
        assert!(state.add_relay("wss://b").unwrap());
        assert!(!state.add_relay(" wss://a ").unwrap());

        assert_eq!(state.relay_urls(), vec!["wss://b", "wss://a"]);
    }

    #[test]
    fn add_relay_rejects_invalid_url_without_storing() {
        let mut state = state();
        assert!(matches!(
            state.add_relay("https://a.example"),
            Err(StateError::InvalidRelayUrl(_))
        ));
        assert!(state.relays().is_empty());
    }

    #[test]
    fn add_relay_keeps_existing_grant() {
        let mut state = state();
        let p1 = key();
        state.add_identity(&p1).unwrap();
        state.add_relay("wss://a").unwrap();
        state.grant_permission(&p1, "wss://a", true, false).unwrap();

        assert!(!state.add_relay("wss://a").unwrap());
        assert!(state.identity(&p1).unwrap().permission("wss://a").unwrap().write);
    }

    #[test]
    fn remove_relay_drops_permissions() {
        let mut state = state();
        let p1 = key();
        state.add_identity(&p1).unwrap();
        state.add_relay("wss://a").unwrap();

        state.remove_relay("wss://a").unwrap();
        assert!(state.identity(&p1).unwrap().relay_permissions.is_empty());
        assert!(matches!(
            state.remove_relay("wss://a"),
            Err(StateError::RelayNotFound(_))
        ));
    }

    #[test]
    fn grant_requires_known_relay_and_identity() {
        let mut state = state();
        let p1 = key();
        state.add_identity(&p1).unwrap();

        assert!(matches!(
            state.grant_permission(&p1, "wss://nowhere", true, true),
            Err(StateError::RelayNotFound(_))
        ));

        state.add_relay("wss://a").unwrap();
        assert!(matches!(
            state.grant_permission(&key(), "wss://a", true, true),
            Err(StateError::IdentityNotFound(_))
        ));
    }

    #[test]
    fn readers_follow_grants() {
        let mut state = state();
        let (p1, p2) = (key(), key());
        state.add_identity(&p1).unwrap();
        state.add_identity(&p2).unwrap();
        state.add_relay("wss://a").unwrap();

        assert_eq!(state.readers_for("wss://a").len(), 2);

        state.grant_permission(&p2, "wss://a", true, false).unwrap();
        assert_eq!(state.readers_for("wss://a"), vec![p1.clone()]);

        assert!(state.revoke_permission(&p1, "wss://a").unwrap());
        assert!(!state.revoke_permission(&p1, "wss://a").unwrap());
        assert!(state.readers_for("wss://a").is_empty());
    }

    #[test]
    fn seed_only_fills_empty_directory() {
        let mut state = state();
        let urls = vec![
            "wss://eden.nostr.land".to_string(),
            "not a relay".to_string(),
            "wss://brb.io".to_string(),
        ];

        assert_eq!(state.seed_bootstrap_relays(&urls), 2);
        assert_eq!(state.relay_urls(), vec!["wss://eden.nostr.land", "wss://brb.io"]);
        assert_eq!(state.seed_bootstrap_relays(&urls), 0);
    }
}
