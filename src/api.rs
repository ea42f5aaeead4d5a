//! Facade the host application drives.
//!
//! [`KeistrCore`] wires the vault, app state, relay pool and signing bridge
//! together. It is owned by a single task; every mutation goes through
//! `&mut self`, and relay socket tasks only report back over channels that
//! the owner drains with [`KeistrCore::process_next_relay_event`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use url::Url;
use zeroize::Zeroizing;

use crate::bridge::{BridgeMessage, BridgeReply, BridgeTicket, SigningBridge};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::relay::{LinkEvent, LinkOutput, RelayConnectionStatus, RelayConnector, RelayPool, WebSocketConnector};
use crate::state::{AppState, FileStore, KeyValueStore, StateChange};
use crate::vault::{ImportedKey, KeyVault, RevealConfirmation, SecureKeyStorage};

/// Query parameter carrying the target of an external activation.
const OPEN_URL_PARAM: &str = "openUrl";

/// Core interface for Keistr.
///
/// # Lifecycle
///
/// The host calls [`on_foreground`](Self::on_foreground) when the app
/// becomes active (loads state and connects relays) and
/// [`on_background`](Self::on_background) before it is suspended (cancels
/// open prompts, saves, and disconnects).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use keistr_core::{CoreConfig, KeistrCore};
/// use keistr_core::relay::MockConnector;
/// use keistr_core::state::MemoryStore;
/// use keistr_core::vault::MemorySecureStorage;
///
/// let mut core = KeistrCore::new(
///     CoreConfig::default(),
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemorySecureStorage::new()),
///     Arc::new(MockConnector::new()),
/// );
/// core.on_foreground();
/// let key = core.generate_key().unwrap();
/// assert!(core.state().identity(&key.public_key).unwrap().default_flag);
/// ```
pub struct KeistrCore {
    config: CoreConfig,
    state: AppState,
    vault: KeyVault,
    pool: RelayPool,
    bridge: SigningBridge,
}

impl KeistrCore {
    /// Creates a core over the given storage backends and relay connector.
    ///
    /// Nothing is loaded or connected until [`on_foreground`](Self::on_foreground).
    #[must_use]
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn KeyValueStore>,
        secrets: Arc<dyn SecureKeyStorage>,
        connector: Arc<dyn RelayConnector>,
    ) -> Self {
        Self {
            state: AppState::new(store),
            vault: KeyVault::new(secrets),
            pool: RelayPool::new(connector, config.max_retries),
            bridge: SigningBridge::new(config.approval_timeout),
            config,
        }
    }

    /// Creates a core that talks to relays over WebSockets.
    ///
    /// Must be used from within a tokio runtime once relays connect.
    #[must_use]
    pub fn with_websockets(
        config: CoreConfig,
        store: Arc<dyn KeyValueStore>,
        secrets: Arc<dyn SecureKeyStorage>,
    ) -> Self {
        let connector = Arc::new(WebSocketConnector::new(config.ping_interval));
        Self::new(config, store, secrets, connector)
    }

    /// Creates a core whose state blobs live in the
    /// [`storage_namespace`](CoreConfig::storage_namespace) directory under
    /// `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace directory cannot be created or the
    /// namespace is not a plain directory name.
    pub fn with_file_store(
        config: CoreConfig,
        base_dir: impl AsRef<Path>,
        secrets: Arc<dyn SecureKeyStorage>,
        connector: Arc<dyn RelayConnector>,
    ) -> CoreResult<Self> {
        let store = FileStore::open(base_dir, &config.storage_namespace)?;
        log::debug!("Storing state in {}", store.dir().display());
        Ok(Self::new(config, Arc::new(store), secrets, connector))
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Read access to app state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Subscribes to app state changes.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    /// Connection status of every relay.
    #[must_use]
    pub fn relay_statuses(&self) -> Vec<RelayConnectionStatus> {
        self.pool.statuses()
    }

    // ---- lifecycle ----

    /// Loads state, seeds bootstrap relays on first start, and connects.
    pub fn on_foreground(&mut self) {
        self.state.load();
        if self.state.seed_bootstrap_relays(&self.config.bootstrap_relays) > 0 {
            self.persist();
        }
        self.reconnect_relays();
    }

    /// Cancels open prompts, saves, and disconnects every relay.
    pub fn on_background(&mut self) {
        let cancelled = self.bridge.cancel_all();
        if cancelled > 0 {
            log::info!("Cancelled {cancelled} pending bridge requests");
        }
        self.persist();
        self.pool.disconnect_all();
    }

    fn persist(&self) {
        // Failures are logged by the state; the in-memory copy stays authoritative
        let _ = self.state.save();
    }

    /// Tears down every relay link and builds new ones for the directory.
    fn reconnect_relays(&mut self) {
        let connect = !self.state.identities().is_empty();
        self.pool.reconnect_all(&self.state.relay_urls(), connect);
    }

    fn resubscribe(&mut self, relay_url: &str) {
        let readers = self.state.readers_for(relay_url);
        if let Err(e) = self.pool.resubscribe(relay_url, readers) {
            log::warn!("Failed to update subscription on {relay_url}: {e}");
        }
    }

    // ---- keys ----

    /// Imports a hex or nsec secret and adds its identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is malformed or secure storage fails.
    pub fn import_key(&mut self, secret: &str) -> CoreResult<ImportedKey> {
        let imported = self.vault.import_key(secret)?;
        self.adopt(&imported.public_key)?;
        Ok(imported)
    }

    /// Generates a key and adds its identity.
    ///
    /// # Errors
    ///
    /// Returns an error if secure storage fails.
    pub fn generate_key(&mut self) -> CoreResult<ImportedKey> {
        let generated = self.vault.generate_key()?;
        self.adopt(&generated.public_key)?;
        Ok(generated)
    }

    fn adopt(&mut self, public_key: &str) -> CoreResult<()> {
        if self.state.add_identity(public_key)? {
            self.persist();
            self.reconnect_relays();
        }
        Ok(())
    }

    /// Re-adds identities for secrets found in secure storage without a
    /// matching identity record. Returns the recovered public keys.
    ///
    /// # Errors
    ///
    /// Returns an error if secure storage cannot be enumerated.
    pub fn recover_identities(&mut self) -> CoreResult<Vec<String>> {
        let mut recovered = Vec::new();
        for public_key in self.vault.stored_public_keys()? {
            if self.state.add_identity(&public_key)? {
                recovered.push(public_key);
            }
        }

        if !recovered.is_empty() {
            log::info!("Recovered {} identities from secure storage", recovered.len());
            self.persist();
            self.reconnect_relays();
        }
        Ok(recovered)
    }

    /// Removes an identity and deletes its secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is unknown or the secret cannot be
    /// deleted. The identity record is gone either way.
    pub fn remove_identity(&mut self, public_key: &str) -> CoreResult<()> {
        let removed = self.state.remove_identity(public_key)?;
        self.persist();
        self.reconnect_relays();
        self.vault.delete_key(&removed.public_key)?;
        Ok(())
    }

    /// Makes `public_key` the default identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is unknown.
    pub fn set_default_identity(&mut self, public_key: &str) -> CoreResult<()> {
        self.state.set_default_identity(public_key)?;
        self.persist();
        Ok(())
    }

    /// Reveals the nsec of an identity after the user confirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be loaded.
    pub fn reveal_secret(
        &self,
        public_key: &str,
        confirmation: RevealConfirmation,
    ) -> CoreResult<Zeroizing<String>> {
        Ok(self.vault.reveal_secret(public_key, confirmation)?)
    }

    // ---- relays ----

    /// Adds a relay and reconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a relay URL.
    pub fn add_relay(&mut self, url: &str) -> CoreResult<bool> {
        let added = self.state.add_relay(url)?;
        if added {
            self.persist();
            self.reconnect_relays();
        }
        Ok(added)
    }

    /// Removes a relay and reconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay is unknown.
    pub fn remove_relay(&mut self, url: &str) -> CoreResult<()> {
        self.state.remove_relay(url)?;
        self.persist();
        self.reconnect_relays();
        Ok(())
    }

    /// Sets an identity's permission for a relay and updates its subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity or relay is unknown.
    pub fn grant_permission(
        &mut self,
        public_key: &str,
        relay_url: &str,
        write: bool,
        read: bool,
    ) -> CoreResult<()> {
        self.state
            .grant_permission(public_key, relay_url, write, read)?;
        self.persist();
        self.resubscribe(relay_url.trim());
        Ok(())
    }

    /// Removes an identity's permission for a relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is unknown.
    pub fn revoke_permission(&mut self, public_key: &str, relay_url: &str) -> CoreResult<bool> {
        let revoked = self.state.revoke_permission(public_key, relay_url)?;
        if revoked {
            self.persist();
            self.resubscribe(relay_url.trim());
        }
        Ok(revoked)
    }

    /// Retries every disconnected relay that has attempts left.
    ///
    /// Returns how many sockets were opened. Does nothing without identities.
    pub fn connect_relays(&mut self) -> usize {
        if self.state.identities().is_empty() {
            return 0;
        }
        self.pool.connect_all()
    }

    /// Waits for the next relay event and applies it.
    ///
    /// Returns `false` once no more events can arrive.
    pub async fn process_next_relay_event(&mut self) -> bool {
        match self.pool.next_event().await {
            Some(event) => {
                self.apply_link_event(event);
                true
            }
            None => false,
        }
    }

    /// Applies every relay event that is already queued. Returns how many.
    pub fn process_pending_relay_events(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.pool.try_next_event() {
            self.apply_link_event(event);
            count += 1;
        }
        count
    }

    fn apply_link_event(&mut self, event: LinkEvent) {
        let state = &self.state;
        let output = self
            .pool
            .handle_event(event, |relay_url| state.readers_for(relay_url));

        match output {
            Some(LinkOutput::Profile(profile)) => {
                self.state.apply_profile(profile);
            }
            Some(LinkOutput::EndOfStoredEvents) => self.persist(),
            None => {}
        }
    }

    // ---- sites ----

    /// Handles `<scheme>://?openUrl=<url>` by activating the target site.
    ///
    /// Returns the activated host.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidActivation`] for a foreign scheme or a
    /// missing target, and a state error if the target has no host.
    pub fn open_url(&mut self, activation: &str) -> CoreResult<String> {
        let invalid = || CoreError::InvalidActivation(activation.to_string());

        let parsed = Url::parse(activation).map_err(|_| invalid())?;
        if !parsed.scheme().eq_ignore_ascii_case(&self.config.url_scheme) {
            return Err(invalid());
        }
        let target = parsed
            .query_pairs()
            .find(|(key, _)| key == OPEN_URL_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
            .ok_or_else(invalid)?;

        let host = self.state.activate_url(&target)?;
        self.persist();
        Ok(host)
    }

    /// Toggles the bookmark for the site at `url`. Returns the new flag.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` has no host.
    pub fn toggle_bookmark(&mut self, url: &str) -> CoreResult<bool> {
        let bookmarked = self.state.toggle_bookmark(url)?;
        self.persist();
        Ok(bookmarked)
    }

    /// Forgets a site session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown.
    pub fn remove_session(&mut self, host: &str) -> CoreResult<()> {
        self.state.remove_session(host)?;
        self.persist();
        Ok(())
    }

    // ---- bridge ----

    /// Accepts a message posted by the page at `page_url`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown methods or hostless pages.
    pub fn receive_bridge_message(
        &mut self,
        page_url: &str,
        message: BridgeMessage,
    ) -> CoreResult<BridgeTicket> {
        let ticket = self.bridge.receive(page_url, message, &mut self.state)?;
        if ticket.prompt.is_none() {
            self.persist();
        }
        Ok(ticket)
    }

    /// Answers a pending `getPublicKey` for `site`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is pending or the key is unknown.
    pub fn select_key(&mut self, site: &str, public_key: &str) -> CoreResult<()> {
        self.bridge.select_key(site, public_key, &mut self.state)?;
        self.persist();
        Ok(())
    }

    /// Signs the pending draft for `site`.
    ///
    /// # Errors
    ///
    /// Returns an error if no signature request is pending.
    pub fn approve_signature(&mut self, site: &str) -> CoreResult<BridgeReply> {
        let reply = self
            .bridge
            .approve_signature(site, &mut self.state, &self.vault)?;
        self.persist();
        Ok(reply)
    }

    /// Rejects the pending request for `site` on behalf of the user.
    pub fn reject_request(&mut self, site: &str) -> bool {
        self.bridge.reject(site)
    }

    /// Cancels the pending request for `site`.
    pub fn cancel_request(&mut self, site: &str) -> bool {
        self.bridge.cancel(site)
    }

    /// Rejects prompts older than the approval timeout.
    pub fn expire_requests(&mut self, now: Instant) -> usize {
        self.bridge.expire(now)
    }
}

impl std::fmt::Debug for KeistrCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeistrCore")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("pool", &self.pool)
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}
