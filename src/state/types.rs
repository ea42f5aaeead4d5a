//! Core types for the persisted data model.
//!
//! Identities, relay records and site sessions are plain values owned by
//! [`AppState`](super::AppState). Callers only ever see shared references;
//! every mutation goes through the owner.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{StateError, StateResult};
use crate::nostr::npub_from_hex;

/// Relays seeded into an empty directory on first start.
pub const BOOTSTRAP_RELAYS: &[&str] = &["wss://eden.nostr.land", "wss://brb.io"];

/// Per-identity grant for one relay.
///
/// Keyed by `relay_id` inside its owning [`Identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayPolicy {
    /// Whether the relay may receive events published by the identity.
    pub write: bool,
    /// Whether the relay is asked for the identity's profile metadata.
    pub read: bool,
}

impl RelayPolicy {
    /// Default grant for a newly added relay.
    pub const READ_ONLY: Self = Self {
        write: false,
        read: true,
    };
}

/// A relay permission held by an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPermission {
    /// Relay URL this permission refers to.
    pub relay_id: String,
    /// Whether writing is allowed.
    pub write: bool,
    /// Whether reading is allowed.
    pub read: bool,
}

impl RelayPermission {
    /// Creates a permission for `relay_id`.
    #[must_use]
    pub fn new(relay_id: impl Into<String>, policy: RelayPolicy) -> Self {
        Self {
            relay_id: relay_id.into(),
            write: policy.write,
            read: policy.read,
        }
    }

    /// Returns the read/write flags.
    #[must_use]
    pub const fn policy(&self) -> RelayPolicy {
        RelayPolicy {
            write: self.write,
            read: self.read,
        }
    }
}

/// A key owned by this device.
///
/// Only the public key is recorded here; the secret lives in the
/// [`KeyVault`](crate::vault::KeyVault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Hex public key, unique across identities.
    pub public_key: String,
    /// Whether this is the default identity.
    pub default_flag: bool,
    /// Relay permissions keyed by relay URL.
    pub relay_permissions: BTreeMap<String, RelayPermission>,
}

impl Identity {
    /// Creates a non-default identity with no permissions.
    #[must_use]
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            default_flag: false,
            relay_permissions: BTreeMap::new(),
        }
    }

    /// Returns the permission for `relay_id`, if any.
    #[must_use]
    pub fn permission(&self, relay_id: &str) -> Option<&RelayPermission> {
        self.relay_permissions.get(relay_id)
    }

    /// Returns whether `relay_id` may read this identity's profile.
    #[must_use]
    pub fn can_read(&self, relay_id: &str) -> bool {
        self.permission(relay_id).is_some_and(|p| p.read)
    }

    /// Returns the public key as npub.
    #[must_use]
    pub fn npub(&self) -> Option<String> {
        npub_from_hex(&self.public_key)
    }
}

/// A known relay endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRecord {
    /// Relay URL (`ws://` or `wss://`), the record's identity.
    pub url: String,
    /// Display name advertised by the relay.
    #[serde(default)]
    pub name: String,
    /// Description advertised by the relay.
    #[serde(default)]
    pub description: String,
    /// Operator contact.
    #[serde(default)]
    pub contact: String,
    /// Supported NIP numbers.
    #[serde(default)]
    pub supported_nips: BTreeSet<u16>,
    /// Relay software.
    #[serde(default)]
    pub software: String,
    /// Relay software version.
    #[serde(default)]
    pub version: String,
    /// When this record was last updated (Unix timestamp).
    pub updated_at: i64,
}

impl RelayRecord {
    /// Creates a record for `url` after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidRelayUrl`] if `url` is not a socket URL.
    pub fn new(url: &str) -> StateResult<Self> {
        Ok(Self {
            url: validate_relay_url(url)?,
            name: String::new(),
            description: String::new(),
            contact: String::new(),
            supported_nips: BTreeSet::new(),
            software: String::new(),
            version: String::new(),
            updated_at: chrono::Utc::now().timestamp(),
        })
    }
}

/// Browsing session for one site, identified by host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSession {
    /// Host name, the session's identity.
    pub id: String,
    /// Last URL visited on this host.
    pub url: String,
    /// Last bridge exchange or bookmark toggle (Unix timestamp).
    pub updated_at: i64,
    /// Whether the user bookmarked the site.
    pub bookmarked: bool,
    /// Identity that most recently authenticated to the site.
    #[serde(default)]
    pub bound_public_key: Option<String>,
    /// Site icon, filled in by the host.
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl SiteSession {
    /// Creates a session anchored at the host of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidSiteUrl`] if `url` has no host.
    pub fn new(url: &str) -> StateResult<Self> {
        Ok(Self {
            id: site_host(url)?,
            url: url.to_string(),
            updated_at: chrono::Utc::now().timestamp(),
            bookmarked: false,
            bound_public_key: None,
            icon_url: None,
        })
    }
}

/// Change notification emitted by [`AppState`](super::AppState).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Identities or their permissions changed.
    Identities,
    /// The relay directory changed.
    Relays,
    /// Profile metadata changed.
    Profiles,
    /// Site sessions changed.
    Sessions,
    /// A different site session became active.
    ActiveSession,
    /// Everything was reloaded from storage.
    Reloaded,
}

/// Validates a relay URL and returns it trimmed.
///
/// Accepts `ws://` and `wss://` URLs with a host and no whitespace or
/// credentials.
///
/// # Errors
///
/// Returns [`StateError::InvalidRelayUrl`] otherwise.
pub fn validate_relay_url(url: &str) -> StateResult<String> {
    let trimmed = url.trim();
    let invalid = || StateError::InvalidRelayUrl(url.to_string());

    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let parsed = Url::parse(trimmed).map_err(|_| invalid())?;

    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(invalid());
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(invalid());
    }

    Ok(trimmed.to_string())
}

/// Extracts the lowercase host a site session is keyed by.
///
/// # Errors
///
/// Returns [`StateError::InvalidSiteUrl`] if `url` does not parse or has no host.
pub fn site_host(url: &str) -> StateResult<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .filter(|host| !host.is_empty())
        .ok_or_else(|| StateError::InvalidSiteUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_url_accepts_socket_urls() {
        assert!(validate_relay_url("wss://relay.damus.io").is_ok());
        assert!(validate_relay_url("ws://localhost:7777").is_ok());
        assert!(validate_relay_url("wss://relay.example.com/path?x=1").is_ok());
        assert_eq!(
            validate_relay_url("  wss://nos.lol ").unwrap(),
            "wss://nos.lol"
        );
    }

    #[test]
    fn relay_url_rejects_other_schemes() {
        assert!(validate_relay_url("https://relay.damus.io").is_err());
        assert!(validate_relay_url("relay.damus.io").is_err());
        assert!(validate_relay_url("").is_err());
    }

    #[test]
    fn relay_url_rejects_whitespace_and_credentials() {
        assert!(validate_relay_url("wss://relay .damus.io").is_err());
        assert!(validate_relay_url("wss://user:pw@relay.damus.io").is_err());
        assert!(validate_relay_url("wss://").is_err());
    }

    #[test]
    fn relay_record_new_validates() {
        assert!(RelayRecord::new("wss://brb.io").is_ok());
        assert!(matches!(
            RelayRecord::new("http://brb.io"),
            Err(StateError::InvalidRelayUrl(_))
        ));
    }

    #[test]
    fn site_host_extracts_lowercase_host() {
        assert_eq!(
            site_host("https://Snort.Social/p/abc").unwrap(),
            "snort.social"
        );
        assert!(site_host("not a url").is_err());
        assert!(site_host("data:text/plain,hi").is_err());
    }

    #[test]
    fn identity_can_read() {
        let mut identity = Identity::new("ab".repeat(32));
        identity.relay_permissions.insert(
            "wss://a".to_string(),
            RelayPermission::new("wss://a", RelayPolicy::READ_ONLY),
        );
        identity.relay_permissions.insert(
            "wss://b".to_string(),
            RelayPermission::new(
                "wss://b",
                RelayPolicy {
                    write: true,
                    read: false,
                },
            ),
        );
        assert!(identity.can_read("wss://a"));
        assert!(!identity.can_read("wss://b"));
        assert!(!identity.can_read("wss://c"));
    }

    #[test]
    fn identity_serializes_camel_case() {
        let identity = Identity::new("ab".repeat(32));
        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("publicKey"));
        assert!(json.contains("defaultFlag"));
        assert!(json.contains("relayPermissions"));
    }
}
