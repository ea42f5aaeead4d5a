//! Relay pool: owns every link and routes socket events to them.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::error::{RelayError, RelayResult};
use super::link::{LinkOutput, RelayLink};
use super::transport::{LinkEvent, LinkId, RelayConnector, SocketEvent};
use super::types::RelayConnectionStatus;

/// Manages one [`RelayLink`] per relay in the directory.
///
/// Socket tasks report on a single channel; the owner drains it with
/// [`next_event`](Self::next_event) or [`try_next_event`](Self::try_next_event)
/// and feeds each event back through [`handle_event`](Self::handle_event).
/// Links are rebuilt wholesale by [`reconnect_all`](Self::reconnect_all);
/// events still in flight from an older generation are ignored, and so are
/// events from a socket its link already closed or replaced.
pub struct RelayPool {
    connector: Arc<dyn RelayConnector>,
    links: Vec<RelayLink>,
    next_id: u64,
    max_retries: u32,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl RelayPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(connector: Arc<dyn RelayConnector>, max_retries: u32) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            links: Vec::new(),
            next_id: 0,
            max_retries,
            events_tx,
            events_rx,
        }
    }

    /// Current links in directory order.
    #[must_use]
    pub fn links(&self) -> &[RelayLink] {
        &self.links
    }

    /// Returns the link for `url`.
    #[must_use]
    pub fn link(&self, url: &str) -> Option<&RelayLink> {
        self.links.iter().find(|link| link.url() == url)
    }

    /// Tears down every link, then builds new ones for `urls`.
    ///
    /// New links start with a fresh retry budget. They are connected right
    /// away when `connect` is set.
    pub fn reconnect_all(&mut self, urls: &[String], connect: bool) {
        self.disconnect_all();
        self.links.clear();

        for url in urls {
            let id = LinkId(self.next_id);
            self.next_id += 1;
            self.links.push(RelayLink::new(id, url.clone(), self.max_retries));
        }
        log::debug!("Rebuilt {} relay links", self.links.len());

        if connect {
            self.connect_all();
        }
    }

    /// Connects every disconnected link with retries left.
    ///
    /// Returns how many sockets were opened.
    pub fn connect_all(&mut self) -> usize {
        let connector = self.connector.as_ref();
        let events = &self.events_tx;
        self.links
            .iter_mut()
            .map(|link| link.connect(connector, events))
            .filter(|opened| *opened)
            .count()
    }

    /// Disconnects every link.
    pub fn disconnect_all(&mut self) {
        for link in &mut self.links {
            link.disconnect();
        }
    }

    /// Replaces the author filter of the link for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownRelay`] if no link exists for `url`, or
    /// an error if the subscription cannot be sent.
    pub fn resubscribe(&mut self, url: &str, readers: Vec<String>) -> RelayResult<()> {
        self.links
            .iter_mut()
            .find(|link| link.url() == url)
            .ok_or_else(|| RelayError::UnknownRelay(url.to_string()))?
            .subscribe(readers)
    }

    /// Waits for the next socket event.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events_rx.recv().await
    }

    /// Returns a queued socket event without waiting.
    pub fn try_next_event(&mut self) -> Option<LinkEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Applies a socket event to its link.
    ///
    /// `readers` is asked for the public keys a relay may read when its
    /// socket opens.
    pub fn handle_event(
        &mut self,
        event: LinkEvent,
        readers: impl FnOnce(&str) -> Vec<String>,
    ) -> Option<LinkOutput> {
        let Some(link) = self.links.iter_mut().find(|link| link.id() == event.link) else {
            log::debug!("Ignoring event from retired link to {}", event.url);
            return None;
        };
        if !link.is_current(event.attempt) {
            log::debug!(
                "Ignoring event from closed socket {} to {}",
                event.attempt,
                event.url
            );
            return None;
        }

        match event.event {
            SocketEvent::Connected => {
                let readers = readers(link.url());
                if let Err(e) = link.on_connected(readers) {
                    log::warn!("Failed to subscribe on {}: {e}", link.url());
                }
                None
            }
            SocketEvent::Frame(text) => link.on_frame(&text),
            SocketEvent::Disconnected { reason } => {
                link.on_disconnected(&reason);
                None
            }
        }
    }

    /// Status of every link.
    #[must_use]
    pub fn statuses(&self) -> Vec<RelayConnectionStatus> {
        self.links.iter().map(RelayLink::status).collect()
    }
}

impl std::fmt::Debug for RelayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPool")
            .field("links", &self.links)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
