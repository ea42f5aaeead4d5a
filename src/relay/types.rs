//! Types for relay link state.

/// Connection state of one relay link.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Subscribing -> Subscribed
///       ^_____________|______________|_____________|____________|
///                 socket error or explicit disconnect
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// No socket.
    Disconnected,

    /// Socket is being opened.
    Connecting,

    /// Socket is open, no subscription pending.
    Connected,

    /// `REQ` sent, waiting for end of stored events.
    Subscribing,

    /// Stored events received; live events keep arriving.
    Subscribed,
}

impl LinkState {
    /// Whether a socket is open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::Subscribing | Self::Subscribed)
    }
}

/// Status of a single relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConnectionStatus {
    /// The relay URL.
    pub url: String,
    /// Current link state.
    pub state: LinkState,
    /// Failed connection attempts since the last success.
    pub retry_count: u32,
    /// Active subscription id, if any.
    pub subscription_id: Option<String>,
    /// Number of authors in the active filter.
    pub author_count: usize,
}
