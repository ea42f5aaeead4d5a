//! Nostr event model.
//!
//! This module provides the NIP-01 event types used on both sides of the
//! signer: drafts coming from embedded web content and signed events
//! travelling to and from relays.
//!
//! # Architecture
//!
//! ```text
//! page JSON → EventDraft (validated at the bridge boundary)
//!                  ↓ finalize(signer, now)
//!             UnsignedEvent (pubkey, created_at, id fixed)
//!                  ↓ KeyVault signs id
//!             SignedEvent → page / relays
//! ```

mod error;
mod event;
mod keys;

pub use error::{NostrError, Result};
pub use event::{EventDraft, SignedEvent, UnsignedEvent, KIND_METADATA, KIND_TEXT_NOTE};
pub use keys::{is_valid_public_key, npub_from_hex, parse_public_key, SECP};
