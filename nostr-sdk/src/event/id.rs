use bitcoin_hashes::{sha256, Hash};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{kind::EventKind, tag::Tag, PubKey, Timestamp};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct EventId(pub String);

impl EventId {
  ///
  /// 32-bytes lowercase hex-encoded sha256 of the serialized event data:
  ///
  /// `[0, <pubkey>, <created_at>, <kind>, <tags>, <content>]`
  ///
  /// <https://github.com/nostr-protocol/nips/blob/master/01.md>
  ///
  pub(crate) fn new(
    pubkey: &PubKey,
    created_at: Timestamp,
    kind: EventKind,
    tags: &[Tag],
    content: &str,
  ) -> Self {
    let data = json!([0, pubkey, created_at, kind, tags, content]).to_string();

    let hash = sha256::Hash::hash(data.as_bytes());
    Self(hash.to_string())
  }

  /// 64 lowercase hex characters.
  pub fn is_valid_hex(id: &str) -> bool {
    id.len() == 64 && id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
  }
}
