//! Signing bridge between embedded web content and the key vault.
//!
//! Pages get a NIP-07 style `window.nostr` object from [`INJECTED_SCRIPT`].
//! Its calls arrive here as [`BridgeMessage`]s, are validated into typed
//! [`BridgeRequest`]s, and either resolve immediately or open a pending
//! slot that waits for the user's decision on a [`Prompt`].
//!
//! # Flow
//!
//! ```text
//! page ── BridgeMessage ──▶ SigningBridge::receive ──▶ BridgeTicket { prompt }
//!                                                          │
//! host shows prompt ──▶ select_key / approve_signature / reject / cancel
//!                                                          │
//! page ◀── BridgeReply::to_script ◀── BridgeTicket::reply ◀┘
//! ```
//!
//! # Concurrency
//!
//! One pending request per site. A newer request supersedes the older one,
//! which is rejected as cancelled. Every ticket resolves exactly once,
//! including when the bridge itself is dropped.

mod error;
mod manager;
mod message;

pub use error::{BridgeError, BridgeResult, RejectReason};
pub use manager::{BridgeTicket, Prompt, SigningBridge};
pub use message::{BridgeMessage, BridgeMethod, BridgeReply, BridgeRequest, RelayAccess};

/// Script the host injects into every page at document start.
pub const INJECTED_SCRIPT: &str = include_str!("nostr.js");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_script_defines_every_handler() {
        for method in BridgeMethod::ALL {
            assert!(INJECTED_SCRIPT.contains(method.handler()));
            assert!(INJECTED_SCRIPT.contains(&format!("'{}'", method.name())));
        }
    }
}
