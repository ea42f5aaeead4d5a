//! Keistr Core Library
//!
//! Core functionality for Keistr - a Nostr key custodian that signs for
//! embedded web apps. Secrets stay in the [`vault`], user-visible records
//! live in [`state`], profiles are synced from [`relay`]s, and pages reach
//! the signer through the [`bridge`].
//!
//! Hosts drive everything through [`KeistrCore`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod nostr;
pub mod relay;
pub mod state;
pub mod vault;

pub use api::KeistrCore;
pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
