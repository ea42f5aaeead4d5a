//! Relay connectivity for profile metadata sync.
//!
//! Every relay in the directory gets one [`RelayLink`], owned by the
//! [`RelayPool`]. A link subscribes to kind-0 events authored by the
//! identities allowed to read from that relay and hands verified profiles
//! back to the state owner.
//!
//! # Architecture
//!
//! ```text
//! KeistrCore (owner)
//!     │  handle_event / LinkOutput
//!     ▼
//! RelayPool ── RelayLink (one per relay)
//!     │  SocketHandle / LinkEvent channels
//!     ▼
//! RelayConnector (one tokio task per socket)
//!     │
//!     ▼
//! Nostr Relays
//! ```
//!
//! Socket tasks never touch app state. Everything they observe goes over a
//! channel and is applied by the owner, so profile merges happen in one
//! place regardless of which relay answered first.

mod error;
mod link;
mod message;
mod pool;
mod transport;
mod types;

pub use error::{RelayError, RelayResult};
pub use link::{LinkOutput, RelayLink};
pub use message::{ClientMessage, Filter, RelayMessage, SubscriptionId};
pub use pool::RelayPool;
pub use transport::{
    LinkEvent, LinkId, Outbound, RelayConnector, SocketEvent, SocketHandle, WebSocketConnector,
};
pub use types::{LinkState, RelayConnectionStatus};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockConnector, MockSocket};
