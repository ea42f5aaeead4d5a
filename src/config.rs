//! Runtime configuration for [`KeistrCore`](crate::KeistrCore).

use std::time::Duration;

use crate::state::BOOTSTRAP_RELAYS;

/// Settings the host can tune when constructing the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Namespace the state blobs are stored under; the directory name used
    /// by [`KeistrCore::with_file_store`](crate::KeistrCore::with_file_store).
    pub storage_namespace: String,
    /// Failed connection attempts after which a relay is left alone until
    /// the next explicit reconnect.
    pub max_retries: u32,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
    /// How long a prompt may stay unanswered; `None` waits forever.
    pub approval_timeout: Option<Duration>,
    /// Relays seeded into an empty directory.
    pub bootstrap_relays: Vec<String>,
    /// URL scheme for external activation (`<scheme>://?openUrl=...`).
    pub url_scheme: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_namespace: "keistr".to_string(),
            max_retries: 5,
            ping_interval: Duration::from_secs(5),
            approval_timeout: Some(Duration::from_secs(120)),
            bootstrap_relays: BOOTSTRAP_RELAYS.iter().map(ToString::to_string).collect(),
            url_scheme: "keistr".to_string(),
        }
    }
}

impl CoreConfig {
    /// Creates the default configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use keistr_core::CoreConfig;
    ///
    /// let config = CoreConfig::new()
    ///     .with_max_retries(3)
    ///     .with_approval_timeout(None)
    ///     .with_bootstrap_relays(["wss://relay.example.com"]);
    /// assert_eq!(config.max_retries, 3);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage namespace.
    #[must_use]
    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    /// Sets the retry bound per relay.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the ping interval.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the prompt timeout.
    #[must_use]
    pub const fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Replaces the bootstrap relays.
    #[must_use]
    pub fn with_bootstrap_relays(
        mut self,
        relays: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.bootstrap_relays = relays.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the external activation scheme.
    #[must_use]
    pub fn with_url_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.url_scheme = scheme.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.storage_namespace, "keistr");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.approval_timeout, Some(Duration::from_secs(120)));
        assert_eq!(
            config.bootstrap_relays,
            vec!["wss://eden.nostr.land", "wss://brb.io"]
        );
        assert_eq!(config.url_scheme, "keistr");
    }

    #[test]
    fn builders_override_fields() {
        let config = CoreConfig::new()
            .with_storage_namespace("test")
            .with_max_retries(1)
            .with_ping_interval(Duration::from_secs(30))
            .with_approval_timeout(None)
            .with_bootstrap_relays(Vec::<String>::new())
            .with_url_scheme("nostrsigner");

        assert_eq!(config.storage_namespace, "test");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert!(config.approval_timeout.is_none());
        assert!(config.bootstrap_relays.is_empty());
        assert_eq!(config.url_scheme, "nostrsigner");
    }
}
