//! Reusable fixtures for Keistr integration tests.
//!
//! Every core runs over in-memory storage and a mock relay connector, so
//! tests drive sockets by hand and never touch the network.

#![allow(dead_code)]

use std::sync::Arc;

use keistr_core::nostr::{EventDraft, SignedEvent, KIND_METADATA};
use keistr_core::relay::{MockConnector, MockSocket};
use keistr_core::state::MemoryStore;
use keistr_core::vault::{MemorySecureStorage, VaultKeypair};
use keistr_core::{CoreConfig, KeistrCore};

/// Relays every fixture starts with.
pub const RELAY_A: &str = "wss://a.example";
pub const RELAY_B: &str = "wss://b.example";

/// A core plus handles to its backends.
pub struct Fixture {
    pub core: KeistrCore,
    pub store: Arc<MemoryStore>,
    pub secrets: Arc<MemorySecureStorage>,
    pub connector: Arc<MockConnector>,
}

impl Fixture {
    /// Builds a foregrounded core seeded with [`RELAY_A`] only.
    pub fn new() -> Self {
        Self::with_relays(&[RELAY_A])
    }

    /// Builds a foregrounded core seeded with `relays`.
    pub fn with_relays(relays: &[&str]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let secrets = Arc::new(MemorySecureStorage::new());
        let connector = Arc::new(MockConnector::new());
        let mut core = build_core(relays, &store, &secrets, &connector);
        core.on_foreground();
        Self {
            core,
            store,
            secrets,
            connector,
        }
    }

    /// Builds a second core over the same storage, as after an app restart.
    pub fn restart(&self) -> KeistrCore {
        let connector = Arc::new(MockConnector::new());
        let mut core = build_core(&[], &self.store, &self.secrets, &connector);
        core.on_foreground();
        core
    }

    /// Sockets opened since the last call.
    pub fn opened(&self) -> Vec<MockSocket> {
        self.connector.take_opened()
    }

    /// Socket for `url` among those opened since the last call.
    pub fn opened_for(&self, url: &str) -> MockSocket {
        self.opened()
            .into_iter()
            .find(|socket| socket.url == url)
            .unwrap_or_else(|| panic!("no socket opened for {url}"))
    }
}

fn build_core(
    relays: &[&str],
    store: &Arc<MemoryStore>,
    secrets: &Arc<MemorySecureStorage>,
    connector: &Arc<MockConnector>,
) -> KeistrCore {
    let config = CoreConfig::new().with_bootstrap_relays(relays.iter().copied());
    KeistrCore::new(config, store.clone(), secrets.clone(), connector.clone())
}

/// Generates a keypair and returns it with its hex secret for importing.
pub fn keypair_with_secret() -> (VaultKeypair, String) {
    loop {
        let bytes: [u8; 32] = rand::random();
        if let Ok(keypair) = VaultKeypair::from_secret_bytes(bytes) {
            return (keypair, hex::encode(bytes));
        }
    }
}

/// Signs a kind-0 metadata event for `keypair`.
pub fn metadata_event(keypair: &VaultKeypair, content: &str, created_at: i64) -> SignedEvent {
    keypair
        .sign_draft(EventDraft::new(KIND_METADATA, vec![], content), created_at)
        .expect("should sign metadata")
}

/// Wraps `event` in an `EVENT` frame for `subscription_id`.
pub fn event_frame(subscription_id: &str, event: &SignedEvent) -> String {
    let event = serde_json::to_value(event).expect("should serialize event");
    serde_json::json!(["EVENT", subscription_id, event]).to_string()
}

/// An `EOSE` frame for `subscription_id`.
pub fn eose_frame(subscription_id: &str) -> String {
    serde_json::json!(["EOSE", subscription_id]).to_string()
}
