//! Socket transport for relay links.
//!
//! Each link's socket runs in its own tokio task and talks to the owner
//! only through channels: outbound frames arrive on the link's
//! [`SocketHandle`], and everything the socket observes is reported as a
//! [`LinkEvent`] on the pool's shared event channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::error::{RelayError, RelayResult};

/// Identifies one link generation inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) u64);

/// What a socket task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket is open.
    Connected,
    /// A text frame arrived.
    Frame(String),
    /// The socket failed to open or closed.
    Disconnected {
        /// Human readable cause.
        reason: String,
    },
}

/// A [`SocketEvent`] tagged with the link and socket it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Link generation that produced the event.
    pub link: LinkId,
    /// Connection attempt of that link whose socket produced the event.
    pub attempt: u32,
    /// Relay URL.
    pub url: String,
    /// What happened.
    pub event: SocketEvent,
}

/// Command for a socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the socket and end the task.
    Close,
}

/// Owner side of a socket task.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle {
    /// Creates a handle and the receiver its socket task reads from.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { outbound }, rx)
    }

    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] if the socket task has ended.
    pub fn send_text(&self, url: &str, text: String) -> RelayResult<()> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| RelayError::NotConnected(url.to_string()))
    }

    /// Asks the socket task to close. Does nothing if it already ended.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Opens sockets for relay links.
pub trait RelayConnector: Send + Sync {
    /// Starts connecting to `url`.
    ///
    /// The implementation reports progress on `events`, tagged with `link`
    /// and `attempt`: exactly one [`SocketEvent::Connected`] once open, then
    /// frames, and finally one [`SocketEvent::Disconnected`].
    fn open(
        &self,
        url: &str,
        link: LinkId,
        attempt: u32,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> SocketHandle;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    ping_interval: Duration,
}

impl WebSocketConnector {
    /// Creates a connector that pings every `ping_interval`.
    #[must_use]
    pub const fn new(ping_interval: Duration) -> Self {
        Self { ping_interval }
    }
}

impl RelayConnector for WebSocketConnector {
    fn open(
        &self,
        url: &str,
        link: LinkId,
        attempt: u32,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> SocketHandle {
        let (handle, outbound) = SocketHandle::channel();
        let url = url.to_string();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_socket(
                    url,
                    (link, attempt),
                    events,
                    outbound,
                    self.ping_interval,
                ));
            }
            Err(e) => {
                let _ = events.send(LinkEvent {
                    link,
                    attempt,
                    url,
                    event: SocketEvent::Disconnected {
                        reason: format!("no async runtime: {e}"),
                    },
                });
            }
        }

        handle
    }
}

async fn run_socket(
    url: String,
    (link, attempt): (LinkId, u32),
    events: mpsc::UnboundedSender<LinkEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ping_interval: Duration,
) {
    let tag = (link, attempt);
    let reason = match pump(&url, tag, &events, &mut outbound, ping_interval).await {
        Ok(()) => "closed".to_string(),
        Err(e) => e.to_string(),
    };

    let _ = events.send(LinkEvent {
        link,
        attempt,
        url,
        event: SocketEvent::Disconnected { reason },
    });
}

async fn pump(
    url: &str,
    (link, attempt): (LinkId, u32),
    events: &mpsc::UnboundedSender<LinkEvent>,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    ping_interval: Duration,
) -> RelayResult<()> {
    let report = |event: SocketEvent| {
        events
            .send(LinkEvent {
                link,
                attempt,
                url: url.to_string(),
                event,
            })
            .is_ok()
    };
    let closed = |reason: String| RelayError::Closed {
        url: url.to_string(),
        reason,
    };

    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| RelayError::Connection {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !report(SocketEvent::Connected) {
        return Ok(());
    }

    let (mut write, mut read) = ws_stream.split();
    let mut ping = tokio::time::interval(ping_interval);
    // First tick fires immediately
    ping.tick().await;

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    write
                        .send(Message::Text(text))
                        .await
                        .map_err(|e| closed(e.to_string()))?;
                }
                Some(Outbound::Close) | None => {
                    let _ = write.close().await;
                    return Ok(());
                }
            },

            _ = ping.tick() => {
                write
                    .send(Message::Ping(Vec::new()))
                    .await
                    .map_err(|e| closed(format!("ping failed: {e}")))?;
            }

            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if !report(SocketEvent::Frame(text)) {
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    return Err(closed("closed by relay".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(closed(e.to_string())),
                None => return Err(closed("stream ended".to_string())),
            },
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnector, MockSocket};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::{LinkEvent, LinkId, Outbound, RelayConnector, SocketEvent, SocketHandle};

    /// Connector that opens nothing and lets tests drive each socket.
    #[derive(Debug, Default)]
    pub struct MockConnector {
        opened: Mutex<Vec<MockSocket>>,
    }

    /// Test side of one socket opened by [`MockConnector`].
    #[derive(Debug)]
    pub struct MockSocket {
        /// Link the socket was opened for.
        pub link: LinkId,
        /// Connection attempt of that link.
        pub attempt: u32,
        /// Relay URL.
        pub url: String,
        events: mpsc::UnboundedSender<LinkEvent>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
    }

    impl MockConnector {
        /// Creates a connector with no sockets.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Removes and returns every socket opened since the last call.
        pub fn take_opened(&self) -> Vec<MockSocket> {
            self.opened
                .lock()
                .map(|mut opened| std::mem::take(&mut *opened))
                .unwrap_or_default()
        }
    }

    impl RelayConnector for MockConnector {
        fn open(
            &self,
            url: &str,
            link: LinkId,
            attempt: u32,
            events: mpsc::UnboundedSender<LinkEvent>,
        ) -> SocketHandle {
            let (handle, outbound) = SocketHandle::channel();
            if let Ok(mut opened) = self.opened.lock() {
                opened.push(MockSocket {
                    link,
                    attempt,
                    url: url.to_string(),
                    events,
                    outbound,
                });
            }
            handle
        }
    }

    impl MockSocket {
        fn emit(&self, event: SocketEvent) {
            let _ = self.events.send(LinkEvent {
                link: self.link,
                attempt: self.attempt,
                url: self.url.clone(),
                event,
            });
        }

        /// Reports the socket as open.
        pub fn accept(&self) {
            self.emit(SocketEvent::Connected);
        }

        /// Delivers a text frame from the relay.
        pub fn deliver(&self, text: impl Into<String>) {
            self.emit(SocketEvent::Frame(text.into()));
        }

        /// Reports the socket as failed or closed.
        pub fn fail(&self, reason: impl Into<String>) {
            self.emit(SocketEvent::Disconnected {
                reason: reason.into(),
            });
        }

        /// Drains the frames and commands the link sent so far.
        pub fn sent(&mut self) -> Vec<Outbound> {
            let mut sent = Vec::new();
            while let Ok(command) = self.outbound.try_recv() {
                sent.push(command);
            }
            sent
        }

        /// Drains the text frames the link sent so far.
        pub fn sent_text(&mut self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|command| match command {
                    Outbound::Text(text) => Some(text),
                    Outbound::Close => None,
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_reports_ended_task() {
        let (handle, rx) = SocketHandle::channel();
        drop(rx);
        assert!(matches!(
            handle.send_text("wss://a", "x".to_string()),
            Err(RelayError::NotConnected(_))
        ));
        handle.close();
    }

    #[test]
    fn mock_socket_round_trip() {
        let connector = MockConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = connector.open("wss://a", LinkId(7), 1, tx);
        let mut sockets = connector.take_opened();
        assert_eq!(sockets.len(), 1);
        let socket = &mut sockets[0];

        socket.accept();
        socket.deliver("[\"EOSE\",\"x\"]");
        assert_eq!(rx.try_recv().unwrap().event, SocketEvent::Connected);
        assert!(matches!(rx.try_recv().unwrap().event, SocketEvent::Frame(_)));

        handle.send_text("wss://a", "hello".to_string()).unwrap();
        handle.close();
        assert_eq!(
            socket.sent(),
            vec![Outbound::Text("hello".to_string()), Outbound::Close]
        );
    }

    #[test]
    fn websocket_connector_without_runtime_reports_disconnect() {
        let connector = WebSocketConnector::new(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = connector.open("wss://a.invalid", LinkId(1), 1, tx);

        assert!(matches!(
            rx.try_recv().unwrap().event,
            SocketEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn websocket_connector_reports_connect_failure() {
        let connector = WebSocketConnector::new(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = connector.open("ws://127.0.0.1:1", LinkId(1), 3, tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.link, LinkId(1));
        assert_eq!(event.attempt, 3);
        assert!(matches!(event.event, SocketEvent::Disconnected { .. }));
    }
}
