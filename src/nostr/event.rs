//! Nostr event types for signing and relay traffic.
//!
//! - [`EventDraft`]: an unsigned event as requested by embedded web content
//! - [`UnsignedEvent`]: a draft with author, timestamp and id fixed
//! - [`SignedEvent`]: a complete NIP-01 event as sent to or received from relays

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::nostr::error::{NostrError, Result};
use crate::nostr::keys::{parse_public_key, SECP};

/// Event kind for user profile metadata (NIP-01).
pub const KIND_METADATA: u16 = 0;

/// Event kind for short text notes.
pub const KIND_TEXT_NOTE: u16 = 1;

/// A signing request as it arrives from web content.
///
/// `kind`, `tags` and `content` are mandatory. `id`, `pubkey` and
/// `created_at` may be omitted and are filled in at signing time.
/// Unknown fields (for example a stale `sig`) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDraft {
    /// Event kind.
    pub kind: u16,

    /// Event tags.
    pub tags: Vec<Vec<String>>,

    /// Event content.
    pub content: String,

    /// Precomputed event id, checked against the computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Author the page expects to sign with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,

    /// Unix timestamp chosen by the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl EventDraft {
    /// Creates a draft with only the mandatory fields set.
    #[must_use]
    pub fn new(kind: u16, tags: Vec<Vec<String>>, content: impl Into<String>) -> Self {
        Self {
            kind,
            tags,
            content: content.into(),
            id: None,
            pubkey: None,
            created_at: None,
        }
    }

    /// Validates an untyped JSON value into a draft.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidDraft`] if the value is not an object or
    /// a mandatory field is missing or has the wrong type.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(NostrError::InvalidDraft("expected a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| NostrError::InvalidDraft(e.to_string()))
    }

    /// Validates a JSON string into a draft.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidDraft`] if the JSON is malformed or does
    /// not describe a draft.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| NostrError::InvalidDraft(e.to_string()))?;
        Self::from_value(value)
    }

    /// Fixes the author, timestamp and id of this draft.
    ///
    /// `now` is used when the draft carries no `created_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft names another author than `signer`
    /// or carries an id that does not match its content.
    pub fn finalize(self, signer: &str, now: i64) -> Result<UnsignedEvent> {
        if let Some(ref pubkey) = self.pubkey {
            if !pubkey.eq_ignore_ascii_case(signer) {
                return Err(NostrError::PubkeyMismatch {
                    draft: pubkey.clone(),
                    signer: signer.to_string(),
                });
            }
        }

        let pubkey = signer.to_ascii_lowercase();
        let created_at = self.created_at.unwrap_or(now);
        let id = calculate_id(&pubkey, created_at, self.kind, &self.tags, &self.content)?;

        if let Some(ref claimed) = self.id {
            if !claimed.eq_ignore_ascii_case(&id) {
                return Err(NostrError::InvalidDraft(format!(
                    "id {claimed} does not match computed id {id}"
                )));
            }
        }

        Ok(UnsignedEvent {
            id,
            pubkey,
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        })
    }
}

/// An event whose id is computed but which still lacks a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    /// Event id (hex SHA256).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp.
    pub created_at: i64,
    /// Event kind.
    pub kind: u16,
    /// Event tags.
    pub tags: Vec<Vec<String>>,
    /// Event content.
    pub content: String,
}

impl UnsignedEvent {
    /// Returns the id as the 32-byte digest that gets signed.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is not 32 bytes of hex.
    pub fn id_bytes(&self) -> Result<[u8; 32]> {
        hex::decode(&self.id)?
            .try_into()
            .map_err(|_| NostrError::InvalidEvent("Invalid ID length".to_string()))
    }

    /// Attaches a hex Schnorr signature.
    #[must_use]
    pub fn into_signed(self, sig: String) -> SignedEvent {
        SignedEvent {
            id: self.id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}

/// A signed Nostr event.
///
/// # Structure
///
/// ```json
/// {
///   "id": "...",           // SHA256 of serialized event
///   "pubkey": "...",       // author public key
///   "created_at": 123456,  // Unix timestamp
///   "kind": 0,
///   "tags": [],
///   "content": "...",
///   "sig": "..."           // Schnorr signature
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedEvent {
    /// Event ID (32-byte SHA256 hash, hex-encoded)
    pub id: String,

    /// Author public key (32 bytes, hex-encoded)
    pub pubkey: String,

    /// Unix timestamp when the event was created
    pub created_at: i64,

    /// Event kind
    pub kind: u16,

    /// Event tags
    pub tags: Vec<Vec<String>>,

    /// Event content
    pub content: String,

    /// Schnorr signature (64 bytes, hex-encoded)
    pub sig: String,
}

impl SignedEvent {
    /// Serializes this event to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(NostrError::from)
    }

    /// Deserializes a signed event from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(NostrError::from)
    }

    /// Returns whether this is a profile metadata event.
    #[must_use]
    pub const fn is_metadata(&self) -> bool {
        self.kind == KIND_METADATA
    }

    /// Verifies the event id and signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the id does not match the content or the
    /// signature is invalid.
    pub fn verify_signature(&self) -> Result<()> {
        use nostr::secp256k1::{schnorr::Signature, Message};

        let pubkey = parse_public_key(&self.pubkey)?;

        let sig_bytes: [u8; 64] = hex::decode(&self.sig)?
            .try_into()
            .map_err(|_| NostrError::InvalidEvent("Invalid signature length".to_string()))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| NostrError::InvalidEvent(format!("Invalid signature: {e}")))?;

        let calculated_id = calculate_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;

        if !bool::from(calculated_id.as_bytes().ct_eq(self.id.as_bytes())) {
            return Err(NostrError::InvalidEvent("Event ID mismatch".to_string()));
        }

        let id_bytes: [u8; 32] = hex::decode(&self.id)?
            .try_into()
            .map_err(|_| NostrError::InvalidEvent("Invalid ID length".to_string()))?;
        let message = Message::from_digest(id_bytes);

        SECP.verify_schnorr(&signature, &message, &pubkey)
            .map_err(|_| NostrError::InvalidSignature)
    }
}

/// Calculates the event ID per NIP-01.
///
/// The ID is the SHA256 hash of the serialized event array:
/// `[0, pubkey, created_at, kind, tags, content]`
fn calculate_id(
    pubkey: &str,
    created_at: i64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String> {
    let serialized = serde_json::to_string(&(0, pubkey, created_at, kind, tags, content))?;

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::secp256k1::{Keypair, Message};
    use nostr::Keys;

    fn sign(draft: EventDraft, keys: &Keys) -> SignedEvent {
        let pubkey = hex::encode(keys.public_key().to_bytes());
        let unsigned = draft.finalize(&pubkey, 1_700_000_000).unwrap();
        let keypair = Keypair::from_seckey_slice(&SECP, &keys.secret_key().secret_bytes()).unwrap();
        let message = Message::from_digest(unsigned.id_bytes().unwrap());
        let sig = SECP.sign_schnorr(&message, &keypair);
        unsigned.into_signed(hex::encode(sig.serialize()))
    }

    #[test]
    fn draft_requires_kind_tags_content() {
        assert!(EventDraft::from_json(r#"{"kind":1,"tags":[],"content":"hi"}"#).is_ok());
        assert!(matches!(
            EventDraft::from_json(r#"{"tags":[],"content":"hi"}"#),
            Err(NostrError::InvalidDraft(_))
        ));
        assert!(matches!(
            EventDraft::from_json(r#"{"kind":1,"content":"hi"}"#),
            Err(NostrError::InvalidDraft(_))
        ));
        assert!(matches!(
            EventDraft::from_json(r#"{"kind":1,"tags":[]}"#),
            Err(NostrError::InvalidDraft(_))
        ));
    }

    #[test]
    fn draft_rejects_wrong_types() {
        assert!(EventDraft::from_json(r#"{"kind":"1","tags":[],"content":""}"#).is_err());
        assert!(EventDraft::from_json(r#"{"kind":1,"tags":[[1]],"content":""}"#).is_err());
        assert!(EventDraft::from_json(r#"{"kind":1,"tags":[],"content":5}"#).is_err());
        assert!(EventDraft::from_json(r#"{"kind":70000,"tags":[],"content":""}"#).is_err());
        assert!(EventDraft::from_json("[1,2,3]").is_err());
        assert!(EventDraft::from_json("not json").is_err());
    }

    #[test]
    fn draft_keeps_optional_fields() {
        let draft = EventDraft::from_json(
            r#"{"kind":1,"tags":[["t","x"]],"content":"hi","created_at":5,"sig":"ignored"}"#,
        )
        .unwrap();
        assert_eq!(draft.created_at, Some(5));
        assert_eq!(draft.pubkey, None);
        assert_eq!(draft.tags, vec![vec!["t".to_string(), "x".to_string()]]);
    }

    #[test]
    fn finalize_fills_missing_fields() {
        let keys = Keys::generate();
        let pubkey = hex::encode(keys.public_key().to_bytes());
        let unsigned = EventDraft::new(KIND_TEXT_NOTE, vec![], "hi")
            .finalize(&pubkey, 42)
            .unwrap();
        assert_eq!(unsigned.pubkey, pubkey);
        assert_eq!(unsigned.created_at, 42);
        assert_eq!(unsigned.id.len(), 64);
    }

    #[test]
    fn finalize_rejects_foreign_pubkey() {
        let signer = hex::encode(Keys::generate().public_key().to_bytes());
        let other = hex::encode(Keys::generate().public_key().to_bytes());
        let mut draft = EventDraft::new(KIND_TEXT_NOTE, vec![], "hi");
        draft.pubkey = Some(other);
        assert!(matches!(
            draft.finalize(&signer, 1),
            Err(NostrError::PubkeyMismatch { .. })
        ));
    }

    #[test]
    fn finalize_checks_claimed_id() {
        let signer = hex::encode(Keys::generate().public_key().to_bytes());
        let expected = EventDraft::new(KIND_TEXT_NOTE, vec![], "hi")
            .finalize(&signer, 7)
            .unwrap();

        let mut good = EventDraft::new(KIND_TEXT_NOTE, vec![], "hi");
        good.created_at = Some(7);
        good.id = Some(expected.id.clone());
        assert_eq!(good.finalize(&signer, 99).unwrap().id, expected.id);

        let mut bad = EventDraft::new(KIND_TEXT_NOTE, vec![], "hi");
        bad.created_at = Some(7);
        bad.id = Some("00".repeat(32));
        assert!(matches!(
            bad.finalize(&signer, 99),
            Err(NostrError::InvalidDraft(_))
        ));
    }

    #[test]
    fn signed_event_verifies() {
        let keys = Keys::generate();
        let event = sign(EventDraft::new(KIND_METADATA, vec![], "{}"), &keys);
        assert!(event.verify_signature().is_ok());
        assert!(event.is_metadata());
    }

    #[test]
    fn tampered_content_fails_verification() {
        let keys = Keys::generate();
        let mut event = sign(EventDraft::new(KIND_TEXT_NOTE, vec![], "hello"), &keys);
        event.content = "goodbye".to_string();
        assert!(event.verify_signature().is_err());
    }

    #[test]
    fn wrong_author_fails_verification() {
        let keys = Keys::generate();
        let mut event = sign(EventDraft::new(KIND_TEXT_NOTE, vec![], "hello"), &keys);
        let other = sign(EventDraft::new(KIND_TEXT_NOTE, vec![], "hello"), &Keys::generate());
        event.sig = other.sig;
        assert!(event.verify_signature().is_err());
    }

    #[test]
    fn signature_interoperates_with_nostr_crate() {
        use nostr::JsonUtil;

        let keys = Keys::generate();
        let event = sign(
            EventDraft::new(KIND_TEXT_NOTE, vec![vec!["t".into(), "rust".into()]], "hi"),
            &keys,
        );
        let parsed = nostr::Event::from_json(event.to_json().unwrap()).unwrap();
        assert!(parsed.verify().is_ok());
    }

    #[test]
    fn json_roundtrip() {
        let keys = Keys::generate();
        let event = sign(EventDraft::new(KIND_TEXT_NOTE, vec![], "hi"), &keys);
        let recovered = SignedEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(event, recovered);
    }
}
