//! Integration tests for identities, the relay directory and persistence.

mod helpers;

use std::sync::Arc;

use helpers::{keypair_with_secret, Fixture, RELAY_A, RELAY_B};
use keistr_core::state::{FileStore, RelayPolicy, StateChange, StateError, IDENTITIES_KEY};
use keistr_core::vault::{KeyVault, MemorySecureStorage, RevealConfirmation};
use keistr_core::{CoreConfig, CoreError, KeistrCore};

#[test]
fn second_import_is_not_default() {
    let mut fx = Fixture::new();
    let first = fx.core.generate_key().unwrap();
    let second = fx.core.generate_key().unwrap();

    let state = fx.core.state();
    assert!(state.identity(&first.public_key).unwrap().default_flag);
    assert!(!state.identity(&second.public_key).unwrap().default_flag);
    assert_eq!(
        state.default_identity().map(|i| i.public_key.as_str()),
        Some(first.public_key.as_str())
    );
}

#[test]
fn new_relay_grants_read_only_to_existing_identities() {
    let mut fx = Fixture::new();
    let a = fx.core.generate_key().unwrap();
    let b = fx.core.generate_key().unwrap();
    fx.core
        .grant_permission(&a.public_key, RELAY_A, true, true)
        .unwrap();

    assert!(fx.core.add_relay(RELAY_B).unwrap());

    let state = fx.core.state();
    for key in [&a.public_key, &b.public_key] {
        let permission = state.identity(key).unwrap().permission(RELAY_B).unwrap();
        assert_eq!(permission.policy(), RelayPolicy::READ_ONLY);
    }
    // Existing grants are untouched
    let kept = state.identity(&a.public_key).unwrap().permission(RELAY_A).unwrap();
    assert!(kept.write && kept.read);
    // Newest relay first
    assert_eq!(state.relay_urls(), vec![RELAY_B, RELAY_A]);
}

#[test]
fn duplicate_and_invalid_relays() {
    let mut fx = Fixture::new();
    assert!(!fx.core.add_relay(RELAY_A).unwrap());
    assert!(matches!(
        fx.core.add_relay("https://not-a-relay.example"),
        Err(CoreError::State(StateError::InvalidRelayUrl(_)))
    ));
    assert!(matches!(
        fx.core.remove_relay(RELAY_B),
        Err(CoreError::State(StateError::RelayNotFound(_)))
    ));
}

#[test]
fn removing_default_promotes_next_identity() {
    let mut fx = Fixture::new();
    let first = fx.core.generate_key().unwrap();
    let second = fx.core.generate_key().unwrap();

    fx.core.remove_identity(&first.public_key).unwrap();

    let state = fx.core.state();
    assert_eq!(state.identities().len(), 1);
    assert!(state.identity(&second.public_key).unwrap().default_flag);
    assert!(state.profile(&first.public_key).is_none());
}

#[test]
fn set_default_identity_moves_the_flag() {
    let mut fx = Fixture::new();
    let first = fx.core.generate_key().unwrap();
    let second = fx.core.generate_key().unwrap();

    fx.core.set_default_identity(&second.public_key).unwrap();

    let defaults: Vec<_> = fx
        .core
        .state()
        .identities()
        .iter()
        .filter(|identity| identity.default_flag)
        .map(|identity| identity.public_key.clone())
        .collect();
    assert_eq!(defaults, vec![second.public_key]);
    assert!(fx.core.set_default_identity(&"0".repeat(64)).is_err());
    assert!(!fx.core.state().identity(&first.public_key).unwrap().default_flag);
}

#[test]
fn state_survives_restart() {
    let mut fx = Fixture::new();
    let key = fx.core.generate_key().unwrap();
    fx.core.add_relay(RELAY_B).unwrap();
    fx.core.toggle_bookmark("https://snort.social/p/1").unwrap();
    fx.core.on_background();

    let restarted = fx.restart();
    let state = restarted.state();
    assert!(state.identity(&key.public_key).unwrap().default_flag);
    assert_eq!(state.relay_urls(), vec![RELAY_B, RELAY_A]);
    assert!(state.session("snort.social").unwrap().bookmarked);
    assert!(state.profile(&key.public_key).is_some());
}

#[test]
fn identities_are_recovered_from_secure_storage() {
    let fx = Fixture::new();
    let (_, secret) = keypair_with_secret();

    // Same secrets, but the state blobs were lost
    let mut core = KeistrCore::new(
        CoreConfig::new().with_bootstrap_relays([RELAY_A]),
        Arc::new(keistr_core::state::MemoryStore::new()),
        fx.secrets.clone(),
        fx.connector.clone(),
    );
    let imported = KeyVault::new(fx.secrets.clone()).import_key(&secret).unwrap();

    core.on_foreground();
    assert!(core.state().identities().is_empty());

    let recovered = core.recover_identities().unwrap();
    assert_eq!(recovered, vec![imported.public_key.clone()]);
    assert!(core.state().identity(&imported.public_key).unwrap().default_flag);
    assert!(core.recover_identities().unwrap().is_empty());
}

#[test]
fn reveal_secret_returns_nsec_for_stored_key() {
    let mut fx = Fixture::new();
    let (keypair, secret) = keypair_with_secret();
    fx.core.import_key(&secret).unwrap();

    let nsec = fx
        .core
        .reveal_secret(&keypair.pubkey_hex(), RevealConfirmation::user_confirmed())
        .unwrap();
    assert!(nsec.starts_with("nsec1"));

    // Importing the nsec resolves to the same identity
    let again = fx.core.import_key(&nsec).unwrap();
    assert!(again.already_present);
    assert_eq!(fx.core.state().identities().len(), 1);
}

#[test]
fn failed_save_keeps_memory_state() {
    let mut fx = Fixture::new();
    fx.store.set_failing(true);
    let key = fx.core.generate_key().unwrap();

    let persisted = |fx: &Fixture| {
        fx.store
            .raw(IDENTITIES_KEY)
            .is_some_and(|blob| String::from_utf8_lossy(&blob).contains(&key.public_key))
    };

    assert!(fx.core.state().identity(&key.public_key).is_some());
    assert!(!persisted(&fx));

    fx.store.set_failing(false);
    fx.core.on_background();
    assert!(persisted(&fx));
}

#[test]
fn file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Arc::new(MemorySecureStorage::new());
    let connector = Arc::new(keistr_core::relay::MockConnector::new());
    let config = CoreConfig::new().with_bootstrap_relays([RELAY_A]);

    let public_key = {
        let store = Arc::new(FileStore::open(dir.path(), &config.storage_namespace).unwrap());
        let mut core = KeistrCore::new(config.clone(), store, secrets.clone(), connector.clone());
        core.on_foreground();
        let key = core.generate_key().unwrap();
        core.on_background();
        key.public_key
    };

    let store = Arc::new(FileStore::open(dir.path(), &config.storage_namespace).unwrap());
    let mut core = KeistrCore::new(config, store, secrets, connector);
    core.on_foreground();
    assert!(core.state().identity(&public_key).is_some());
    assert_eq!(core.state().relay_urls(), vec![RELAY_A]);
}

#[test]
fn file_backed_core_uses_the_configured_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Arc::new(MemorySecureStorage::new());
    let connector = Arc::new(keistr_core::relay::MockConnector::new());
    let config = CoreConfig::new()
        .with_storage_namespace("signer")
        .with_bootstrap_relays([RELAY_A]);

    let public_key = {
        let mut core =
            KeistrCore::with_file_store(config.clone(), dir.path(), secrets.clone(), connector.clone())
                .unwrap();
        core.on_foreground();
        let key = core.generate_key().unwrap();
        core.on_background();
        key.public_key
    };
    assert!(dir.path().join("signer").is_dir());
    assert!(!dir.path().join("keistr").exists());

    // Another namespace starts empty
    let mut other = KeistrCore::with_file_store(
        CoreConfig::new().with_bootstrap_relays([RELAY_A]),
        dir.path(),
        secrets.clone(),
        connector.clone(),
    )
    .unwrap();
    other.on_foreground();
    assert!(other.state().identities().is_empty());

    let mut core = KeistrCore::with_file_store(config, dir.path(), secrets, connector).unwrap();
    core.on_foreground();
    assert!(core.state().identity(&public_key).is_some());

    assert!(matches!(
        KeistrCore::with_file_store(
            CoreConfig::new().with_storage_namespace("../escape"),
            dir.path(),
            Arc::new(MemorySecureStorage::new()),
            Arc::new(keistr_core::relay::MockConnector::new()),
        ),
        Err(CoreError::State(StateError::Storage(_)))
    ));
}

#[test]
fn changes_are_broadcast() {
    let mut fx = Fixture::new();
    let mut changes = fx.core.subscribe();

    fx.core.generate_key().unwrap();
    fx.core.add_relay(RELAY_B).unwrap();

    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        seen.push(change);
    }
    assert!(seen.contains(&StateChange::Identities));
    assert!(seen.contains(&StateChange::Relays));
}
