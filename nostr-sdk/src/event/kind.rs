use serde::de::{Deserialize, Deserializer, Error, Visitor};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Defines the type of the event.
/// Different types will change the meaning of the
/// `content` and `tags` of the event.
/// `Text` is the default.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
  /// Stringified JSON object describing the user who created the event.
  Metadata,
  /// Plaintext note.
  #[default]
  Text,
  /// URL of a relay the event creator wants to recommend.
  RecommendRelay,
  /// Deletion request (NIP-09). References events through `e` tags.
  Deletion,
  /// Ephemeral event answering a relay AUTH challenge (NIP-42).
  ClientAuth,
  /// Ephemeral event carried in an `Authorization` header (NIP-98).
  HttpAuth,
  /// Long-form article (NIP-23).
  LongFormArticle,
  /// Index of a multi-section publication.
  PublicationIndex,
  /// One section of a multi-section publication.
  PublicationContent,
  /// Wiki article.
  Wiki,
  /// Anything we don't give a name to.
  Custom(u64),
}

impl EventKind {
  pub fn as_u64(&self) -> u64 {
    (*self).into()
  }

  /// Replaceable kinds: `0`, `3` and `10000..20000`.
  pub fn is_replaceable(&self) -> bool {
    let kind = self.as_u64();
    kind == 0 || kind == 3 || (10_000..20_000).contains(&kind)
  }

  /// Ephemeral kinds (`20000..30000`) are never stored by relays.
  pub fn is_ephemeral(&self) -> bool {
    (20_000..30_000).contains(&self.as_u64())
  }

  /// Addressable kinds (`30000..40000`), identified by their `d` tag.
  pub fn is_parameterized_replaceable(&self) -> bool {
    (30_000..40_000).contains(&self.as_u64())
  }
}

impl FromStr for EventKind {
  type Err = ParseIntError;
  fn from_str(event_kind: &str) -> Result<Self, Self::Err> {
    let event_kind: u64 = event_kind.parse()?;
    Ok(Self::from(event_kind))
  }
}

impl From<u64> for EventKind {
  fn from(u: u64) -> Self {
    match u {
      0 => Self::Metadata,
      1 => Self::Text,
      2 => Self::RecommendRelay,
      5 => Self::Deletion,
      22242 => Self::ClientAuth,
      27235 => Self::HttpAuth,
      30023 => Self::LongFormArticle,
      30040 => Self::PublicationIndex,
      30041 => Self::PublicationContent,
      30818 => Self::Wiki,
      x => Self::Custom(x),
    }
  }
}

impl From<EventKind> for u64 {
  fn from(e: EventKind) -> u64 {
    match e {
      EventKind::Metadata => 0,
      EventKind::Text => 1,
      EventKind::RecommendRelay => 2,
      EventKind::Deletion => 5,
      EventKind::ClientAuth => 22242,
      EventKind::HttpAuth => 27235,
      EventKind::LongFormArticle => 30023,
      EventKind::PublicationIndex => 30040,
      EventKind::PublicationContent => 30041,
      EventKind::Wiki => 30818,
      EventKind::Custom(u) => u,
    }
  }
}

impl Serialize for EventKind {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_u64(From::from(*self))
  }
}

struct EventKindVisitor;

impl Visitor<'_> for EventKindVisitor {
  type Value = EventKind;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "an unsigned number of maximum length of 64 bits")
  }

  fn visit_u64<E>(self, v: u64) -> Result<EventKind, E>
  where
    E: Error,
  {
    Ok(From::<u64>::from(v))
  }

  fn visit_i64<E>(self, v: i64) -> Result<EventKind, E>
  where
    E: Error,
  {
    u64::try_from(v)
      .map(EventKind::from)
      .map_err(|_| E::custom("event kind must be non-negative"))
  }
}

impl<'de> Deserialize<'de> for EventKind {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    deserializer.deserialize_u64(EventKindVisitor)
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.as_u64())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn named_kinds_map_both_ways() {
    for (number, kind) in [
      (0, EventKind::Metadata),
      (1, EventKind::Text),
      (5, EventKind::Deletion),
      (22242, EventKind::ClientAuth),
      (27235, EventKind::HttpAuth),
      (30023, EventKind::LongFormArticle),
      (30040, EventKind::PublicationIndex),
      (30041, EventKind::PublicationContent),
      (30818, EventKind::Wiki),
    ] {
      assert_eq!(EventKind::from(number), kind);
      assert_eq!(kind.as_u64(), number);
    }
    assert_eq!(EventKind::from(9735), EventKind::Custom(9735));
  }

  #[test]
  fn serializes_as_plain_number() {
    assert_eq!(serde_json::to_string(&EventKind::Wiki).unwrap(), "30818");
    let kind: EventKind = serde_json::from_str("30040").unwrap();
    assert_eq!(kind, EventKind::PublicationIndex);
    assert!(serde_json::from_str::<EventKind>("-1").is_err());
  }

  #[test]
  fn classification() {
    assert!(EventKind::LongFormArticle.is_parameterized_replaceable());
    assert!(EventKind::ClientAuth.is_ephemeral());
    assert!(EventKind::Metadata.is_replaceable());
    assert!(!EventKind::Text.is_replaceable());
    assert_eq!("30023".parse::<EventKind>().unwrap(), EventKind::LongFormArticle);
  }
}
