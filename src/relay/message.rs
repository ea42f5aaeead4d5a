//! Relay wire protocol (NIP-01 client and relay messages).

use serde::Serialize;
use serde_json::Value;

use super::error::{RelayError, RelayResult};
use crate::nostr::{SignedEvent, KIND_METADATA};

/// Subscription identifier: 16 random bytes as hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generates a random id.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// The id as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    /// Author public keys (hex).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Event kinds.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u16>,
}

impl Filter {
    /// Profile metadata authored by `authors`.
    #[must_use]
    pub fn profiles(authors: Vec<String>) -> Self {
        Self {
            authors,
            kinds: vec![KIND_METADATA],
        }
    }
}

/// Message sent to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `["REQ", id, filter...]`
    Req {
        /// Subscription id.
        subscription_id: SubscriptionId,
        /// Filters, OR-ed by the relay.
        filters: Vec<Filter>,
    },
    /// `["CLOSE", id]`
    Close(SubscriptionId),
}

impl ClientMessage {
    /// Encodes the message as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter fails to serialize.
    pub fn to_json(&self) -> RelayResult<String> {
        let frame = match self {
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = vec![
                    Value::from("REQ"),
                    Value::from(subscription_id.as_str()),
                ];
                for filter in filters {
                    frame.push(serde_json::to_value(filter)?);
                }
                frame
            }
            Self::Close(subscription_id) => {
                vec![Value::from("CLOSE"), Value::from(subscription_id.as_str())]
            }
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

/// Message received from a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", id, event]`
    Event {
        /// Subscription the event answers.
        subscription_id: String,
        /// The event, not yet verified.
        event: Box<SignedEvent>,
    },
    /// `["NOTICE", message]`
    Notice(String),
    /// `["EOSE", id]`
    EndOfStoredEvents(String),
    /// Any other well-formed message (`OK`, `AUTH`, `CLOSED`, ...).
    Other(Vec<Value>),
}

impl RelayMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMessage`] if the frame is not a JSON
    /// array led by a message type, or a known message is malformed.
    pub fn parse(text: &str) -> RelayResult<Self> {
        let values: Vec<Value> = serde_json::from_str(text)
            .map_err(|e| RelayError::InvalidMessage(e.to_string()))?;

        let kind = values
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::InvalidMessage("missing message type".to_string()))?;

        match kind {
            "EVENT" => {
                let subscription_id = string_at(&values, 1)?;
                let event = values
                    .get(2)
                    .cloned()
                    .ok_or_else(|| RelayError::InvalidMessage("EVENT without event".to_string()))
                    .and_then(|value| {
                        serde_json::from_value::<SignedEvent>(value)
                            .map_err(|e| RelayError::InvalidMessage(e.to_string()))
                    })?;
                Ok(Self::Event {
                    subscription_id,
                    event: Box::new(event),
                })
            }
            "NOTICE" => Ok(Self::Notice(string_at(&values, 1)?)),
            "EOSE" => Ok(Self::EndOfStoredEvents(string_at(&values, 1)?)),
            _ => Ok(Self::Other(values)),
        }
    }
}

fn string_at(values: &[Value], index: usize) -> RelayResult<String> {
    values
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::InvalidMessage(format!("expected string at position {index}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nostr::EventDraft;
    use crate::vault::VaultKeypair;

    #[test]
    fn subscription_ids_are_random_hex() {
        let a = SubscriptionId::generate();
        let b = SubscriptionId::generate();
        assert_eq!(a.as_str().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn req_encodes_profile_filter() {
        let id = SubscriptionId::generate();
        let json = ClientMessage::Req {
            subscription_id: id.clone(),
            filters: vec![Filter::profiles(vec!["aa".to_string()])],
        }
        .to_json()
        .unwrap();

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0], "REQ");
        assert_eq!(value[1], id.as_str());
        assert_eq!(value[2]["authors"][0], "aa");
        assert_eq!(value[2]["kinds"][0], 0);
    }

    #[test]
    fn close_encodes() {
        let id = SubscriptionId::generate();
        let json = ClientMessage::Close(id.clone()).to_json().unwrap();
        assert_eq!(json, format!(r#"["CLOSE","{id}"]"#));
    }

    #[test]
    fn parses_event() {
        let keys = VaultKeypair::generate();
        let event = keys
            .sign_draft(EventDraft::new(0, vec![], "{}"), 1_700_000_000)
            .unwrap();
        let frame = format!(r#"["EVENT","sub",{}]"#, event.to_json().unwrap());

        match RelayMessage::parse(&frame).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event: parsed,
            } => {
                assert_eq!(subscription_id, "sub");
                assert_eq!(*parsed, event);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_notice_eose_and_other() {
        assert_eq!(
            RelayMessage::parse(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice("slow down".to_string())
        );
        assert_eq!(
            RelayMessage::parse(r#"["EOSE","sub"]"#).unwrap(),
            RelayMessage::EndOfStoredEvents("sub".to_string())
        );
        assert!(matches!(
            RelayMessage::parse(r#"["OK","id",true,""]"#).unwrap(),
            RelayMessage::Other(_)
        ));
    }

    #[test]
    fn rejects_malformed_frames() {
        for frame in [
            "",
            "not json",
            "{}",
            "[]",
            "[1,2]",
            r#"["EVENT","sub"]"#,
            r#"["EVENT","sub",{"id":"x"}]"#,
            r#"["EOSE"]"#,
        ] {
            assert!(
                matches!(RelayMessage::parse(frame), Err(RelayError::InvalidMessage(_))),
                "{frame} should not parse"
            );
        }
    }
}
