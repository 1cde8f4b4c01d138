use serde::{Deserialize, Serialize};
use std::fmt;

/// The first element of a tag, telling what the rest of it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
  /// `["p", <pubkey>, <relay-url>]`
  PubKey,
  /// `["e", <event-id>, <relay-url>, <marker>]`
  Event,
  /// `["k", <kind>]`: kind of the referenced event (deletions).
  Kind,
  /// `["d", <identifier>]`: stable identifier of addressable events.
  Identifier,
  /// `["relay", <url>]` (NIP-42)
  Relay,
  /// `["challenge", <string>]` (NIP-42)
  Challenge,
  /// `["u", <absolute-url>]` (NIP-98)
  Url,
  /// `["method", <HTTP method>]` (NIP-98)
  Method,
  /// `["payload", <sha256 hex>]` (NIP-98)
  Payload,
  /// Custom tag
  Custom(String),
}

impl fmt::Display for TagKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::PubKey => write!(f, "p"),
      Self::Event => write!(f, "e"),
      Self::Kind => write!(f, "k"),
      Self::Identifier => write!(f, "d"),
      Self::Relay => write!(f, "relay"),
      Self::Challenge => write!(f, "challenge"),
      Self::Url => write!(f, "u"),
      Self::Method => write!(f, "method"),
      Self::Payload => write!(f, "payload"),
      Self::Custom(tag) => write!(f, "{tag}"),
    }
  }
}

impl<S> From<S> for TagKind
where
  S: Into<String>,
{
  fn from(s: S) -> Self {
    let s: String = s.into();
    match s.as_str() {
      "p" => Self::PubKey,
      "e" => Self::Event,
      "k" => Self::Kind,
      "d" => Self::Identifier,
      "relay" => Self::Relay,
      "challenge" => Self::Challenge,
      "u" => Self::Url,
      "method" => Self::Method,
      "payload" => Self::Payload,
      tag => Self::Custom(tag.to_string()),
    }
  }
}

/// A tag is an ordered list of strings. The order of the elements
/// (and the order of tags inside an event) is part of the signed data,
/// so it is kept exactly as received.
///
///   ```json
///   ["e", "688787d8ff144c502c7f5cffaafe2cc588d86079f9de88304c26b0cb99ce91c6", "wss://relay.damus.io", "root"]
///   ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
  pub fn new<S>(values: Vec<S>) -> Self
  where
    S: Into<String>,
  {
    Self(values.into_iter().map(|v| v.into()).collect())
  }

  fn with_kind(kind: TagKind, values: Vec<String>) -> Self {
    let mut tag = vec![kind.to_string()];
    tag.extend(values);
    Self(tag)
  }

  /// `["e", <event-id>]` or `["e", <event-id>, <relay-url>]`
  pub fn event(event_id: &str, relay_url: Option<&str>) -> Self {
    let mut values = vec![event_id.to_string()];
    if let Some(url) = relay_url {
      values.push(url.to_string());
    }
    Self::with_kind(TagKind::Event, values)
  }

  pub fn pubkey(pubkey: &str) -> Self {
    Self::with_kind(TagKind::PubKey, vec![pubkey.to_string()])
  }

  pub fn kind(kind: u64) -> Self {
    Self::with_kind(TagKind::Kind, vec![kind.to_string()])
  }

  pub fn identifier(identifier: &str) -> Self {
    Self::with_kind(TagKind::Identifier, vec![identifier.to_string()])
  }

  pub fn relay(url: &str) -> Self {
    Self::with_kind(TagKind::Relay, vec![url.to_string()])
  }

  pub fn challenge(challenge: &str) -> Self {
    Self::with_kind(TagKind::Challenge, vec![challenge.to_string()])
  }

  pub fn url(url: &str) -> Self {
    Self::with_kind(TagKind::Url, vec![url.to_string()])
  }

  pub fn method(method: &str) -> Self {
    Self::with_kind(TagKind::Method, vec![method.to_string()])
  }

  pub fn payload(hash: &str) -> Self {
    Self::with_kind(TagKind::Payload, vec![hash.to_string()])
  }

  /// `None` for an empty tag.
  pub fn tag_kind(&self) -> Option<TagKind> {
    self.0.first().map(TagKind::from)
  }

  /// Name of the tag as written on the wire.
  pub fn name(&self) -> Option<&str> {
    self.0.first().map(String::as_str)
  }

  /// First value after the tag name.
  pub fn value(&self) -> Option<&str> {
    self.0.get(1).map(String::as_str)
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.0.get(index).map(String::as_str)
  }

  pub fn as_vec(&self) -> &[String] {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<Vec<String>> for Tag {
  fn from(data: Vec<String>) -> Self {
    Self(data)
  }
}

impl From<Tag> for Vec<String> {
  fn from(data: Tag) -> Self {
    data.0
  }
}
