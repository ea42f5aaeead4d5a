//! Bridge wire format between web content and the signer.
//!
//! Inbound, the page posts `{name, body}` through a native message handler.
//! Outbound, the host evaluates a script calling
//! `window.nostr.handler_<name>(...)` with a JSON string literal, or with
//! `undefined` when the request was rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{BridgeError, BridgeResult, RejectReason};
use crate::nostr::{EventDraft, NostrError, SignedEvent};

/// Requests the page can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeMethod {
    /// `getPublicKey`
    GetPublicKey,
    /// `signEvent`
    SignEvent,
    /// `getRelays`
    GetRelays,
}

impl BridgeMethod {
    /// Every method, in handler registration order.
    pub const ALL: [Self; 3] = [Self::GetPublicKey, Self::SignEvent, Self::GetRelays];

    /// Looks up a method by its message name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }

    /// Message name posted by the page.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetPublicKey => "getPublicKey",
            Self::SignEvent => "signEvent",
            Self::GetRelays => "getRelays",
        }
    }

    /// Page function that receives the reply.
    #[must_use]
    pub const fn handler(self) -> &'static str {
        match self {
            Self::GetPublicKey => "handler_getPublicKey",
            Self::SignEvent => "handler_signEvent",
            Self::GetRelays => "handler_getRelays",
        }
    }
}

/// Raw message as posted by the page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BridgeMessage {
    /// Message handler name.
    pub name: String,
    /// Untyped payload.
    #[serde(default)]
    pub body: Value,
}

impl BridgeMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Parses a message envelope.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidMessage`] if `json` is not `{name, body}`.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::InvalidMessage(e.to_string()))
    }

    /// Resolves the message name.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownMethod`] for names without a handler.
    pub fn method(&self) -> BridgeResult<BridgeMethod> {
        BridgeMethod::from_name(&self.name)
            .ok_or_else(|| BridgeError::UnknownMethod(self.name.clone()))
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    /// Asks for a public key.
    GetPublicKey,
    /// Asks for a signature over a draft.
    SignEvent(EventDraft),
    /// Asks for the signer's relay policies.
    GetRelays,
}

impl BridgeRequest {
    /// Validates `body` for `method`.
    ///
    /// A `signEvent` body may be the draft object itself or a JSON string
    /// holding it. Bodies of the other methods are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidDraft`] for a malformed draft.
    pub fn decode(method: BridgeMethod, body: Value) -> Result<Self, NostrError> {
        match method {
            BridgeMethod::GetPublicKey => Ok(Self::GetPublicKey),
            BridgeMethod::GetRelays => Ok(Self::GetRelays),
            BridgeMethod::SignEvent => {
                let draft = match body {
                    Value::String(json) => EventDraft::from_json(&json)?,
                    other => EventDraft::from_value(other)?,
                };
                Ok(Self::SignEvent(draft))
            }
        }
    }

    /// The method this request answers.
    #[must_use]
    pub const fn method(&self) -> BridgeMethod {
        match self {
            Self::GetPublicKey => BridgeMethod::GetPublicKey,
            Self::SignEvent(_) => BridgeMethod::SignEvent,
            Self::GetRelays => BridgeMethod::GetRelays,
        }
    }
}

/// Read/write policy reported by `getRelays` (NIP-07 shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayAccess {
    /// Whether the page may read from the relay.
    pub read: bool,
    /// Whether the page may write to the relay.
    pub write: bool,
}

/// Final answer to a bridge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeReply {
    /// Selected public key (hex).
    PublicKey(String),
    /// Signed event.
    SignedEvent(SignedEvent),
    /// Relay policies keyed by URL.
    Relays(BTreeMap<String, RelayAccess>),
    /// No result.
    Rejected {
        /// Method that was rejected.
        method: BridgeMethod,
        /// Why.
        reason: RejectReason,
    },
}

impl BridgeReply {
    /// Builds a rejection.
    #[must_use]
    pub const fn rejected(method: BridgeMethod, reason: RejectReason) -> Self {
        Self::Rejected { method, reason }
    }

    /// Method this reply answers.
    #[must_use]
    pub const fn method(&self) -> BridgeMethod {
        match self {
            Self::PublicKey(_) => BridgeMethod::GetPublicKey,
            Self::SignedEvent(_) => BridgeMethod::SignEvent,
            Self::Relays(_) => BridgeMethod::GetRelays,
            Self::Rejected { method, .. } => *method,
        }
    }

    /// Rejection reason, if rejected.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Script that hands this reply to the page.
    #[must_use]
    pub fn to_script(&self) -> String {
        let argument = match self {
            Self::PublicKey(public_key) => js_string(public_key),
            Self::SignedEvent(event) => serde_json::to_string(event)
                .ok()
                .and_then(|json| js_string(&json)),
            Self::Relays(relays) => serde_json::to_string(relays)
                .ok()
                .and_then(|json| js_string(&json)),
            Self::Rejected { .. } => None,
        };

        format!(
            "window.nostr.{}({})",
            self.method().handler(),
            argument.as_deref().unwrap_or("undefined")
        )
    }
}

/// Quotes `value` as a JSON string, which is also a valid JS string literal.
fn js_string(value: &str) -> Option<String> {
    serde_json::to_string(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultKeypair;

    #[test]
    fn method_names_round_trip() {
        for method in BridgeMethod::ALL {
            assert_eq!(BridgeMethod::from_name(method.name()), Some(method));
            assert!(method.handler().ends_with(method.name()));
        }
        assert_eq!(BridgeMethod::from_name("encrypt"), None);
    }

    #[test]
    fn message_envelope_parses() {
        let message = BridgeMessage::from_json(r#"{"name":"getPublicKey","body":null}"#).unwrap();
        assert_eq!(message.method().unwrap(), BridgeMethod::GetPublicKey);

        let unknown = BridgeMessage::from_json(r#"{"name":"nip04.encrypt"}"#).unwrap();
        assert!(matches!(
            unknown.method(),
            Err(BridgeError::UnknownMethod(_))
        ));

        assert!(BridgeMessage::from_json("[]").is_err());
    }

    #[test]
    fn sign_event_accepts_string_or_object_body() {
        let draft = r#"{"kind":1,"tags":[],"content":"hi"}"#;

        let from_string =
            BridgeRequest::decode(BridgeMethod::SignEvent, Value::String(draft.to_string())).unwrap();
        let from_object =
            BridgeRequest::decode(BridgeMethod::SignEvent, serde_json::from_str(draft).unwrap())
                .unwrap();

        assert_eq!(from_string, from_object);
        assert_eq!(from_string.method(), BridgeMethod::SignEvent);
    }

    #[test]
    fn sign_event_rejects_incomplete_draft() {
        for body in [
            Value::Null,
            Value::String("not json".to_string()),
            serde_json::json!({"kind": 1, "tags": []}),
            serde_json::json!({"kind": "1", "tags": [], "content": ""}),
            serde_json::json!({"kind": 1, "tags": [[1]], "content": ""}),
        ] {
            assert!(BridgeRequest::decode(BridgeMethod::SignEvent, body).is_err());
        }
    }

    #[test]
    fn public_key_script_quotes_argument() {
        let script = BridgeReply::PublicKey("ab".repeat(32)).to_script();
        assert_eq!(
            script,
            format!("window.nostr.handler_getPublicKey(\"{}\")", "ab".repeat(32))
        );
    }

    #[test]
    fn rejected_script_passes_undefined() {
        let script =
            BridgeReply::rejected(BridgeMethod::SignEvent, RejectReason::UserRejected).to_script();
        assert_eq!(script, "window.nostr.handler_signEvent(undefined)");
    }

    #[test]
    fn signed_event_script_embeds_json_string() {
        let keys = VaultKeypair::generate();
        let event = keys
            .sign_draft(EventDraft::new(1, vec![], "it's \"quoted\"\n"), 1)
            .unwrap();
        let script = BridgeReply::SignedEvent(event.clone()).to_script();

        let literal = script
            .strip_prefix("window.nostr.handler_signEvent(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap();
        let json: String = serde_json::from_str(literal).unwrap();
        assert_eq!(SignedEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn relays_script_encodes_policies() {
        let mut relays = BTreeMap::new();
        relays.insert(
            "wss://a".to_string(),
            RelayAccess {
                read: true,
                write: false,
            },
        );
        let script = BridgeReply::Relays(relays).to_script();
        assert!(script.starts_with("window.nostr.handler_getRelays(\""));
        assert!(script.contains(r#"\"read\":true"#));
    }
}
