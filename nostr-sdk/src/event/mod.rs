use std::time::{SystemTime, UNIX_EPOCH};

use secp256k1::{KeyPair, Secp256k1};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Event Modules
pub mod id;
pub mod kind;
pub mod tag;

use self::id::EventId;
use self::kind::EventKind;
use self::tag::{Tag, TagKind};
use crate::error::ValidationError;

pub type PubKey = String;
pub type Timestamp = u64;

/// [`Event`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
}

/// Seconds since the unix epoch.
pub fn timestamp_now() -> Timestamp {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default()
}

fn is_lower_hex(value: &str, len: usize) -> bool {
  value.len() == len && value.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

///
/// Event is the only object that exists in the Nostr protocol.
///
/// Example:
///   ```json
///   {
///     "id": "00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae",
///     "pubkey": "614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6",
///     "created_at": 1684589418,
///     "kind": 1,
///     "tags": [],
///     "content": "potato",
///     "sig": "bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf"
///   }
///   ```
///
/// Once signed, an event must not be mutated: any change to its fields
/// invalidates both `id` and `sig`.
///
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Event {
  /// 32-bytes SHA256 of the serialized event data
  pub id: String,
  /// 32-bytes hex-encoded x-only public key of the event creator
  pub pubkey: PubKey,
  /// Unix timestamp in seconds
  pub created_at: Timestamp,
  /// Kind of event
  pub kind: EventKind,
  /// Ordered list of tags. The kind of event will change their meaning.
  pub tags: Vec<Tag>,
  /// Arbitrary string. Meaning depends on the kind of the event.
  pub content: String,
  /// 64-bytes hex signature of the id field
  #[serde(default)]
  pub sig: String,
}

impl Event {
  pub fn new_without_signature(
    pubkey: PubKey,
    created_at: Timestamp,
    kind: EventKind,
    tags: Vec<Tag>,
    content: String,
  ) -> Self {
    let id = EventId::new(&pubkey, created_at, kind, &tags, &content);
    Self {
      id: id.0,
      pubkey,
      created_at,
      kind,
      tags,
      content,
      ..Default::default()
    }
  }

  /// Signs the event id with `keypair`.
  pub fn sign_event(&mut self, keypair: &KeyPair) -> Result<(), ValidationError> {
    let secp = Secp256k1::new();
    let signed = crate::schnorr::sign_schnorr(&secp, &self.id, keypair)
      .map_err(|err| ValidationError::Signing(err.to_string()))?;
    self.sig = signed.to_string();
    Ok(())
  }

  pub fn check_event_id(&self) -> bool {
    EventId::new(
      &self.pubkey,
      self.created_at,
      self.kind,
      &self.tags,
      &self.content,
    )
    .0 == self.id
  }

  pub fn check_event_signature(&self) -> bool {
    let secp = Secp256k1::verification_only();
    crate::schnorr::verify_schnorr(&secp, &self.id, &self.sig, &self.pubkey).is_ok()
  }

  /// Full validation of a received or freshly signed event.
  pub fn validate(&self) -> Result<(), ValidationError> {
    if !is_lower_hex(&self.id, 64) {
      return Err(ValidationError::MalformedEvent(format!(
        "id `{}` is not 64 lowercase hex characters",
        self.id
      )));
    }
    if !is_lower_hex(&self.pubkey, 64) {
      return Err(ValidationError::MalformedEvent(format!(
        "pubkey `{}` is not 64 lowercase hex characters",
        self.pubkey
      )));
    }
    if self.sig.is_empty() {
      return Err(ValidationError::MissingSignature);
    }
    if !is_lower_hex(&self.sig, 128) {
      return Err(ValidationError::MalformedEvent(
        "signature is not 128 lowercase hex characters".to_string(),
      ));
    }
    if !self.check_event_id() {
      return Err(ValidationError::InvalidId);
    }
    if !self.check_event_signature() {
      return Err(ValidationError::InvalidSignature);
    }
    Ok(())
  }

  pub fn is_signed(&self) -> bool {
    !self.sig.is_empty()
  }

  /// Every tag whose name matches `kind`.
  pub fn tags_of(&self, kind: TagKind) -> impl Iterator<Item = &Tag> {
    self
      .tags
      .iter()
      .filter(move |tag| tag.tag_kind().as_ref() == Some(&kind))
  }

  /// Value of the first tag named `kind`.
  pub fn first_tag_value(&self, kind: TagKind) -> Option<&str> {
    self.tags_of(kind).find_map(|tag| tag.value())
  }

  /// The `d` tag of addressable events.
  pub fn identifier(&self) -> Option<&str> {
    self.first_tag_value(TagKind::Identifier)
  }

  /// Deserializes from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    serde_json::from_value(msg).map_err(Error::Json)
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    json!(self)
  }

  /// Deserialize [`Event`] from JSON string
  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let msg: &str = &msg.into();

    if msg.is_empty() {
      return Err(Error::InvalidData);
    }

    let value: Value = serde_json::from_str(msg)?;
    Self::from_value(value)
  }

  /// Get [`Event`] in JSON string
  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }
}
