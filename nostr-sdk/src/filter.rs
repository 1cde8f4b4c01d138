use serde::{Deserialize, Serialize};

use crate::event::{kind::EventKind, tag::TagKind, Event, PubKey, Timestamp};

///
/// Filters are data structures that clients send to relays to request events.
/// The attributes of a Filter work as `&&` (in other words, all the conditions set must be present
/// in the event in order to pass the filter).
/// P.S.: a "REQ" communication from the client can have multiple filters. In this case, all filters will be
/// used as `||` operator: anything that matches any of the filters will be sent.
///
/// - ids: a list of event ids or prefixes
/// - authors: a list of publickeys or prefixes, the pubkey of an event must be one of these
/// - kinds: a list of kind numbers
/// - #e: a list of event ids that are referenced in an "e" tag,
/// - #p: a list of pubkeys that are referenced in an "p" tag,
/// - #d: a list of identifiers of addressable events,
/// - since: a timestamp. Events must be newer than this to pass
/// - until: a timestamp. Events must be older than this to pass
/// - limit: maximum number of events to be returned in the initial query (it can be ignored afterwards)
///
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Filter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ids: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub authors: Option<Vec<PubKey>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub kinds: Option<Vec<EventKind>>,
  #[serde(rename = "#e", alias = "e", skip_serializing_if = "Option::is_none")]
  pub e: Option<Vec<String>>,
  #[serde(rename = "#p", alias = "p", skip_serializing_if = "Option::is_none")]
  pub p: Option<Vec<String>>,
  #[serde(rename = "#d", alias = "d", skip_serializing_if = "Option::is_none")]
  pub d: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub since: Option<Timestamp>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub until: Option<Timestamp>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u64>,
}

impl Filter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn id<S: Into<String>>(mut self, id: S) -> Self {
    self.ids.get_or_insert_with(Vec::new).push(id.into());
    self
  }

  pub fn author<S: Into<String>>(mut self, author: S) -> Self {
    self.authors.get_or_insert_with(Vec::new).push(author.into());
    self
  }

  pub fn kind(mut self, kind: EventKind) -> Self {
    self.kinds.get_or_insert_with(Vec::new).push(kind);
    self
  }

  pub fn event_ref<S: Into<String>>(mut self, id: S) -> Self {
    self.e.get_or_insert_with(Vec::new).push(id.into());
    self
  }

  pub fn pubkey_ref<S: Into<String>>(mut self, pubkey: S) -> Self {
    self.p.get_or_insert_with(Vec::new).push(pubkey.into());
    self
  }

  pub fn identifier<S: Into<String>>(mut self, identifier: S) -> Self {
    self.d.get_or_insert_with(Vec::new).push(identifier.into());
    self
  }

  pub fn since(mut self, since: Timestamp) -> Self {
    self.since = Some(since);
    self
  }

  pub fn until(mut self, until: Timestamp) -> Self {
    self.until = Some(until);
    self
  }

  pub fn limit(mut self, limit: u64) -> Self {
    self.limit = Some(limit);
    self
  }

  /// A filter without any condition would ask a relay for everything.
  pub fn is_empty(&self) -> bool {
    self.ids.is_none()
      && self.authors.is_none()
      && self.kinds.is_none()
      && self.e.is_none()
      && self.p.is_none()
      && self.d.is_none()
      && self.since.is_none()
      && self.until.is_none()
  }

  /// Relay-side semantics of a single filter. `limit` only bounds the
  /// initial batch, so it does not take part in matching.
  pub fn matches(&self, event: &Event) -> bool {
    if let Some(ids) = &self.ids {
      if !ids.iter().any(|id| event.id.starts_with(id.as_str())) {
        return false;
      }
    }

    if let Some(authors) = &self.authors {
      if !authors
        .iter()
        .any(|author| event.pubkey.starts_with(author.as_str()))
      {
        return false;
      }
    }

    if let Some(kinds) = &self.kinds {
      if !kinds.contains(&event.kind) {
        return false;
      }
    }

    if let Some(since) = self.since {
      if event.created_at < since {
        return false;
      }
    }

    if let Some(until) = self.until {
      if event.created_at > until {
        return false;
      }
    }

    let tag_matches = |kind: TagKind, wanted: &Option<Vec<String>>| match wanted {
      Some(values) => event
        .tags_of(kind)
        .filter_map(|tag| tag.value())
        .any(|value| values.iter().any(|wanted| wanted == value)),
      None => true,
    };

    tag_matches(TagKind::Event, &self.e)
      && tag_matches(TagKind::PubKey, &self.p)
      && tag_matches(TagKind::Identifier, &self.d)
  }

  pub fn as_str(&self) -> String {
    serde_json::json!(self).to_string()
  }

  pub fn from_string(data: String) -> Result<Self, serde_json::error::Error> {
    serde_json::from_str(&data)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::tag::Tag;

  #[cfg(test)]
  use pretty_assertions::assert_eq;
  use serde_json::{json, Value};

  #[test]
  fn from_string() {
    let filter = json!(
    {
      "e": [
        "44b17a5acd66694cbdf5aea08968453658446368d978a15e61e599b8404d82c4",
        "7742783afbf6b283e81af63782ab0c05bbcbccba7f3abce0e0f23706dc27bd42"
      ],
      "#p": ["potato"],
      "kinds": [1, 6, 7, 9735]
    })
    .to_string();

    let filter2 = json!(
    {
      "#e": [
        "44b17a5acd66694cbdf5aea08968453658446368d978a15e61e599b8404d82c4",
        "7742783afbf6b283e81af63782ab0c05bbcbccba7f3abce0e0f23706dc27bd42"
      ],
      "p": ["potato"],
      "kinds": [1, 6, 7, 9735]
    })
    .to_string();

    let expected = Filter {
      e: Some(vec![
        "44b17a5acd66694cbdf5aea08968453658446368d978a15e61e599b8404d82c4".to_string(),
        "7742783afbf6b283e81af63782ab0c05bbcbccba7f3abce0e0f23706dc27bd42".to_string(),
      ]),
      p: Some(vec!["potato".to_string()]),
      kinds: Some(vec![
        EventKind::Text,
        EventKind::Custom(6),
        EventKind::Custom(7),
        EventKind::Custom(9735),
      ]),
      ..Default::default()
    };

    assert_eq!(Filter::from_string(filter).unwrap(), expected);
    assert_eq!(Filter::from_string(filter2).unwrap(), expected);
  }

  #[test]
  fn as_str_uses_tag_names_and_skips_unset_fields() {
    let filter = Filter::new()
      .kind(EventKind::LongFormArticle)
      .author("abc")
      .identifier("my-article")
      .limit(1);

    let result: Value = serde_json::from_str(&filter.as_str()).unwrap();

    assert_eq!(
      result,
      json!({"authors": ["abc"], "kinds": [30023], "#d": ["my-article"], "limit": 1})
    );
  }

  #[test]
  fn empty_filter() {
    assert!(Filter::new().is_empty());
    assert!(Filter::new().limit(10).is_empty());
    assert!(!Filter::new().since(1).is_empty());
  }

  #[test]
  fn test_filter_match_ids_and_prefixes() {
    let event = Event {
      id: String::from("05b25af342504fbf8ef597220858f9ab"),
      ..Default::default()
    };

    assert!(Filter::new().id("05b25af342504fbf8ef597220858f9ab").matches(&event));
    assert!(Filter::new().id("05b25a").matches(&event));
    assert!(!Filter::new().id("f6a54af2").matches(&event));
  }

  #[test]
  fn test_filter_match_authors_and_kinds() {
    let event = Event {
      pubkey: String::from("02c7e1b1e9c175ab2d100baf1d5a66e73ecc044e9f8093d0c965741f26aa3abf76"),
      kind: EventKind::Text,
      ..Default::default()
    };

    assert!(Filter::new().author("02c7e1").kind(EventKind::Text).matches(&event));
    assert!(!Filter::new().author("02c891").matches(&event));
    assert!(!Filter::new().kind(EventKind::Deletion).matches(&event));
  }

  #[test]
  fn test_filter_match_time_range() {
    let event = Event {
      created_at: 1673183423,
      ..Default::default()
    };

    assert!(Filter::new().since(1663183423).until(1683183423).matches(&event));
    assert!(Filter::new().since(1673183423).until(1673183423).matches(&event));
    assert!(!Filter::new().since(1683183423).matches(&event));
    assert!(!Filter::new().until(1663183423).matches(&event));
  }

  #[test]
  fn test_filter_match_any_referenced_tag() {
    let event = Event {
      tags: vec![
        Tag::pubkey("bob"),
        Tag::event("first", None),
        Tag::event("second", Some("wss://relay.example.com")),
        Tag::identifier("page"),
      ],
      ..Default::default()
    };

    assert!(Filter::new().event_ref("second").matches(&event));
    assert!(Filter::new().pubkey_ref("bob").identifier("page").matches(&event));
    assert!(!Filter::new().event_ref("third").matches(&event));
    assert!(!Filter::new().pubkey_ref("alice").matches(&event));
    assert!(!Filter::new().identifier("other").matches(&Event::default()));
  }
}
