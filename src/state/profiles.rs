//! Cached profile metadata (kind-0 events) keyed by public key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::nostr::{npub_from_hex, SignedEvent};

/// Profile metadata for one public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    /// Hex public key this profile describes.
    pub public_key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form bio.
    #[serde(default)]
    pub about: String,
    /// Avatar URL.
    #[serde(default)]
    pub picture: String,
    /// Banner URL.
    #[serde(default)]
    pub banner: String,
    /// NIP-05 identifier.
    #[serde(default)]
    pub nip05: String,
    /// LNURL-pay address (bech32).
    #[serde(default)]
    pub lud06: String,
    /// Lightning address.
    #[serde(default)]
    pub lud16: String,
    /// Timestamp of the event this profile came from; `None` for a placeholder.
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Whether the NIP-05 identifier was verified.
    #[serde(default)]
    pub nip05_verified: bool,
}

/// Fields of a kind-0 event's JSON content.
#[derive(Debug, Default, Deserialize)]
struct MetadataContent {
    name: Option<String>,
    about: Option<String>,
    picture: Option<String>,
    banner: Option<String>,
    nip05: Option<String>,
    lud06: Option<String>,
    lud16: Option<String>,
}

impl ProfileMetadata {
    /// Creates an empty placeholder that any real event supersedes.
    #[must_use]
    pub fn placeholder(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            name: String::new(),
            about: String::new(),
            picture: String::new(),
            banner: String::new(),
            nip05: String::new(),
            lud06: String::new(),
            lud16: String::new(),
            created_at: None,
            nip05_verified: false,
        }
    }

    /// Builds a profile from a kind-0 event.
    ///
    /// Content that is not a JSON object yields a profile with empty fields
    /// but the event's timestamp. The signature is not checked here.
    #[must_use]
    pub fn from_event(event: &SignedEvent) -> Option<Self> {
        if !event.is_metadata() {
            return None;
        }

        let content: MetadataContent = serde_json::from_str(&event.content).unwrap_or_default();

        Some(Self {
            public_key: event.pubkey.to_ascii_lowercase(),
            name: content.name.unwrap_or_default(),
            about: content.about.unwrap_or_default(),
            picture: content.picture.unwrap_or_default(),
            banner: content.banner.unwrap_or_default(),
            nip05: content.nip05.unwrap_or_default(),
            lud06: content.lud06.unwrap_or_default(),
            lud16: content.lud16.unwrap_or_default(),
            created_at: Some(event.created_at),
            nip05_verified: false,
        })
    }

    /// Returns the public key as npub.
    #[must_use]
    pub fn npub(&self) -> Option<String> {
        npub_from_hex(&self.public_key)
    }

    /// Name to show for this key: NIP-05, then name, then npub, then hex.
    #[must_use]
    pub fn best_public_name(&self) -> String {
        if !self.nip05.is_empty() {
            return self.nip05.replace("_@", "");
        }
        if !self.name.is_empty() {
            return self.name.clone();
        }
        self.npub().unwrap_or_else(|| self.public_key.clone())
    }

    /// Whether [`Self::best_public_name`] falls back to the key itself.
    #[must_use]
    pub fn best_public_name_is_key(&self) -> bool {
        self.nip05.is_empty() && self.name.is_empty()
    }

    fn is_older_than(&self, other: &Self) -> bool {
        // None sorts before every Some
        self.created_at < other.created_at
    }
}

/// Profile cache with a newest-timestamp-wins merge.
///
/// Profiles are keyed by lowercase hex public key, whatever case callers use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityStore {
    profiles: BTreeMap<String, ProfileMetadata>,
}

impl IdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `profile` into the store.
    ///
    /// The profile is stored if none exists for its key or if it is strictly
    /// newer than the stored one. Returns whether anything changed.
    pub fn merge(&mut self, mut profile: ProfileMetadata) -> bool {
        profile.public_key.make_ascii_lowercase();
        match self.profiles.get(&profile.public_key) {
            Some(current) if !current.is_older_than(&profile) => false,
            current => {
                if let Some(current) = current {
                    if current.nip05 == profile.nip05 {
                        profile.nip05_verified = current.nip05_verified;
                    }
                }
                self.profiles.insert(profile.public_key.clone(), profile);
                true
            }
        }
    }

    /// Inserts a placeholder for `public_key` if no profile exists.
    pub fn ensure(&mut self, public_key: &str) -> bool {
        let key = public_key.to_ascii_lowercase();
        if self.profiles.contains_key(&key) {
            return false;
        }
        let placeholder = ProfileMetadata::placeholder(&key);
        self.profiles.insert(key, placeholder);
        true
    }

    /// Removes the profile for `public_key`.
    pub fn remove(&mut self, public_key: &str) -> Option<ProfileMetadata> {
        self.profiles.remove(&public_key.to_ascii_lowercase())
    }

    /// Returns the profile for `public_key`.
    #[must_use]
    pub fn get(&self, public_key: &str) -> Option<&ProfileMetadata> {
        self.profiles.get(&public_key.to_ascii_lowercase())
    }

    /// Iterates over all cached profiles.
    pub fn iter(&self) -> impl Iterator<Item = &ProfileMetadata> {
        self.profiles.values()
    }

    /// Number of cached profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns true if no profile is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nostr::{EventDraft, KIND_METADATA, KIND_TEXT_NOTE};
    use crate::vault::VaultKeypair;

    fn metadata_event(keys: &VaultKeypair, content: &str, created_at: i64) -> SignedEvent {
        keys.sign_draft(EventDraft::new(KIND_METADATA, vec![], content), created_at)
            .unwrap()
    }

    fn profile(pk: &str, name: &str, created_at: i64) -> ProfileMetadata {
        ProfileMetadata {
            name: name.to_string(),
            created_at: Some(created_at),
            ..ProfileMetadata::placeholder(pk)
        }
    }

    #[test]
    fn from_event_parses_content() {
        let keys = VaultKeypair::generate();
        let event = metadata_event(
            &keys,
            r#"{"name":"alice","about":"hi","lud16":"alice@ln.example","extra":1}"#,
            100,
        );

        let profile = ProfileMetadata::from_event(&event).unwrap();
        assert_eq!(profile.public_key, keys.pubkey_hex());
        assert_eq!(profile.name, "alice");
        assert_eq!(profile.about, "hi");
        assert_eq!(profile.lud16, "alice@ln.example");
        assert_eq!(profile.created_at, Some(100));
    }

    #[test]
    fn from_event_with_garbage_content_keeps_timestamp() {
        let keys = VaultKeypair::generate();
        let event = metadata_event(&keys, "not json", 42);

        let profile = ProfileMetadata::from_event(&event).unwrap();
        assert!(profile.name.is_empty());
        assert_eq!(profile.created_at, Some(42));
    }

    #[test]
    fn from_event_ignores_other_kinds() {
        let keys = VaultKeypair::generate();
        let event = keys
            .sign_draft(EventDraft::new(KIND_TEXT_NOTE, vec![], "{}"), 1)
            .unwrap();
        assert!(ProfileMetadata::from_event(&event).is_none());
    }

    #[test]
    fn best_public_name_prefers_nip05() {
        let pk = VaultKeypair::generate().pubkey_hex();
        let mut profile = ProfileMetadata::placeholder(&pk);
        assert!(profile.best_public_name().starts_with("npub1"));
        assert!(profile.best_public_name_is_key());

        profile.name = "bob".to_string();
        assert_eq!(profile.best_public_name(), "bob");

        profile.nip05 = "_@bob.example".to_string();
        assert_eq!(profile.best_public_name(), "bob.example");
        assert!(!profile.best_public_name_is_key());
    }

    #[test]
    fn merge_replaces_only_when_strictly_newer() {
        let pk = "ab".repeat(32);
        let mut store = IdentityStore::new();

        assert!(store.merge(profile(&pk, "first", 10)));
        assert!(!store.merge(profile(&pk, "same-time", 10)));
        assert!(!store.merge(profile(&pk, "older", 5)));
        assert!(store.merge(profile(&pk, "newer", 11)));

        assert_eq!(store.get(&pk).unwrap().name, "newer");
    }

    #[test]
    fn placeholder_is_superseded_by_any_event() {
        let pk = "ab".repeat(32);
        let mut store = IdentityStore::new();
        assert!(store.ensure(&pk));
        assert!(!store.ensure(&pk));

        assert!(store.merge(profile(&pk, "early", 0)));
        assert_eq!(store.get(&pk).unwrap().created_at, Some(0));
    }

    #[test]
    fn merge_keeps_verification_for_unchanged_nip05() {
        let pk = "ab".repeat(32);
        let mut store = IdentityStore::new();

        let mut verified = profile(&pk, "a", 1);
        verified.nip05 = "a@example.com".to_string();
        verified.nip05_verified = true;
        store.merge(verified);

        let mut newer = profile(&pk, "a2", 2);
        newer.nip05 = "a@example.com".to_string();
        store.merge(newer);
        assert!(store.get(&pk).unwrap().nip05_verified);

        let mut changed = profile(&pk, "a3", 3);
        changed.nip05 = "other@example.com".to_string();
        store.merge(changed);
        assert!(!store.get(&pk).unwrap().nip05_verified);
    }

    #[test]
    fn uppercase_keys_share_the_lowercase_entry() {
        let keys = VaultKeypair::generate();
        let pk = keys.pubkey_hex();
        let mut event = metadata_event(&keys, r#"{"name":"carol"}"#, 7);
        event.pubkey = pk.to_ascii_uppercase();

        let parsed = ProfileMetadata::from_event(&event).unwrap();
        assert_eq!(parsed.public_key, pk);

        let mut store = IdentityStore::new();
        assert!(store.ensure(&pk));
        assert!(!store.ensure(&pk.to_ascii_uppercase()));
        assert!(store.merge(parsed));
        assert!(store.merge(profile(&pk.to_ascii_uppercase(), "dave", 8)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&pk).unwrap().name, "dave");
        assert_eq!(store.get(&pk.to_ascii_uppercase()).unwrap().public_key, pk);
        assert!(store.remove(&pk.to_ascii_uppercase()).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn store_serializes_as_map() {
        let pk = "ab".repeat(32);
        let mut store = IdentityStore::new();
        store.ensure(&pk);

        let json = serde_json::to_value(&store).unwrap();
        assert!(json.get(&pk).is_some());

        let restored: IdentityStore = serde_json::from_value(json).unwrap();
        assert_eq!(restored, store);
    }
}
