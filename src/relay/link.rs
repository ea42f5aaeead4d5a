//! One relay connection and its profile subscription.

use tokio::sync::mpsc;

use super::error::{RelayError, RelayResult};
use super::message::{ClientMessage, Filter, RelayMessage, SubscriptionId};
use super::transport::{LinkEvent, LinkId, RelayConnector, SocketHandle};
use super::types::{LinkState, RelayConnectionStatus};
use crate::state::ProfileMetadata;

/// Something a link produced that the state owner has to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutput {
    /// A verified profile metadata event.
    Profile(ProfileMetadata),
    /// The relay finished sending stored events for the active subscription.
    EndOfStoredEvents,
}

/// State machine for one relay connection.
///
/// Links never retry on their own. A failed or closed socket leaves the
/// link `Disconnected` until the next [`connect`](Self::connect); failures
/// before the socket opened count against `max_retries`.
///
/// Every [`connect`](Self::connect) numbers its socket with a new attempt;
/// only events from the current attempt's socket may be applied.
#[derive(Debug)]
pub struct RelayLink {
    id: LinkId,
    url: String,
    state: LinkState,
    retry_count: u32,
    max_retries: u32,
    attempt: u32,
    socket: Option<SocketHandle>,
    subscription: Option<SubscriptionId>,
    authors: Vec<String>,
}

impl RelayLink {
    /// Creates a disconnected link.
    #[must_use]
    pub fn new(id: LinkId, url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            id,
            url: url.into(),
            state: LinkState::Disconnected,
            retry_count: 0,
            max_retries,
            attempt: 0,
            socket: None,
            subscription: None,
            authors: Vec::new(),
        }
    }

    /// Link generation id.
    #[must_use]
    pub const fn id(&self) -> LinkId {
        self.id
    }

    /// Relay URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LinkState {
        self.state
    }

    /// Failed connection attempts since the last success.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether events tagged with `attempt` come from the open socket.
    ///
    /// False for every attempt once the socket was closed or reported gone.
    #[must_use]
    pub fn is_current(&self, attempt: u32) -> bool {
        self.socket.is_some() && self.attempt == attempt
    }

    /// Active subscription id.
    #[must_use]
    pub const fn subscription_id(&self) -> Option<&SubscriptionId> {
        self.subscription.as_ref()
    }

    /// Authors in the active filter.
    #[must_use]
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Opens the socket.
    ///
    /// Does nothing unless the link is `Disconnected` with retries left.
    /// Returns whether a socket was opened.
    pub fn connect(
        &mut self,
        connector: &dyn RelayConnector,
        events: &mpsc::UnboundedSender<LinkEvent>,
    ) -> bool {
        if self.state != LinkState::Disconnected {
            return false;
        }
        if self.retry_count >= self.max_retries {
            log::warn!(
                "Not connecting to {}: gave up after {} attempts",
                self.url,
                self.retry_count
            );
            return false;
        }

        log::debug!("Connecting to {}", self.url);
        self.state = LinkState::Connecting;
        self.attempt = self.attempt.wrapping_add(1);
        self.socket = Some(connector.open(&self.url, self.id, self.attempt, events.clone()));
        true
    }

    /// Handles the socket opening and subscribes for `readers`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be sent.
    pub fn on_connected(&mut self, readers: Vec<String>) -> RelayResult<()> {
        if self.state != LinkState::Connecting {
            return Ok(());
        }

        log::info!("Connected to {}", self.url);
        self.state = LinkState::Connected;
        self.retry_count = 0;
        self.subscribe(readers)
    }

    /// Subscribes to profile metadata of `authors`.
    ///
    /// An existing subscription id is reused, so subscribing again replaces
    /// the filter. An empty author set closes the subscription instead.
    /// While disconnected, nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be sent.
    pub fn subscribe(&mut self, authors: Vec<String>) -> RelayResult<()> {
        if authors.is_empty() {
            return self.unsubscribe();
        }
        if !self.state.is_open() {
            return Ok(());
        }

        let subscription_id = self
            .subscription
            .get_or_insert_with(SubscriptionId::generate)
            .clone();
        let frame = ClientMessage::Req {
            subscription_id,
            filters: vec![Filter::profiles(authors.clone())],
        }
        .to_json()?;

        self.send(frame)?;
        self.authors = authors;
        self.state = LinkState::Subscribing;
        Ok(())
    }

    /// Closes the active subscription. No-op without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the `CLOSE` cannot be sent.
    pub fn unsubscribe(&mut self) -> RelayResult<()> {
        let Some(subscription_id) = self.subscription.take() else {
            return Ok(());
        };
        self.authors.clear();

        if matches!(self.state, LinkState::Subscribing | LinkState::Subscribed) {
            self.state = LinkState::Connected;
            self.send(ClientMessage::Close(subscription_id).to_json()?)?;
        }
        Ok(())
    }

    /// Handles an inbound text frame.
    ///
    /// Malformed frames and events that fail verification are dropped.
    pub fn on_frame(&mut self, text: &str) -> Option<LinkOutput> {
        let message = match RelayMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("Dropping frame from {}: {e}", self.url);
                return None;
            }
        };

        match message {
            RelayMessage::Event { event, .. } => {
                if let Err(e) = event.verify_signature() {
                    log::debug!("Discarding event {} from {}: {e}", event.id, self.url);
                    return None;
                }
                ProfileMetadata::from_event(&event).map(LinkOutput::Profile)
            }
            RelayMessage::Notice(notice) => {
                log::info!("Notice from {}: {notice}", self.url);
                None
            }
            RelayMessage::EndOfStoredEvents(subscription_id) => {
                let active = self
                    .subscription
                    .as_ref()
                    .is_some_and(|id| id.as_str() == subscription_id);
                if !active {
                    return None;
                }
                log::info!("End of stored events from {}", self.url);
                if self.state == LinkState::Subscribing {
                    self.state = LinkState::Subscribed;
                }
                Some(LinkOutput::EndOfStoredEvents)
            }
            RelayMessage::Other(_) => None,
        }
    }

    /// Handles the socket failing or closing.
    pub fn on_disconnected(&mut self, reason: &str) {
        if self.state == LinkState::Connecting {
            self.retry_count = self.retry_count.saturating_add(1);
            log::info!(
                "Connection to {} failed ({}/{}): {reason}",
                self.url,
                self.retry_count,
                self.max_retries
            );
        } else if self.state != LinkState::Disconnected {
            log::info!("Disconnected from {}: {reason}", self.url);
        }
        self.state = LinkState::Disconnected;
        self.socket = None;
    }

    /// Closes the socket.
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        if self.state != LinkState::Disconnected {
            log::info!("Disconnecting from {}", self.url);
        }
        self.state = LinkState::Disconnected;
    }

    /// Snapshot for display.
    #[must_use]
    pub fn status(&self) -> RelayConnectionStatus {
        RelayConnectionStatus {
            url: self.url.clone(),
            state: self.state,
            retry_count: self.retry_count,
            subscription_id: self.subscription.as_ref().map(ToString::to_string),
            author_count: self.authors.len(),
        }
    }

    fn send(&self, text: String) -> RelayResult<()> {
        self.socket
            .as_ref()
            .ok_or_else(|| RelayError::NotConnected(self.url.clone()))?
            .send_text(&self.url, text)
    }
}
