use std::fmt;

use serde_json::{json, Value};

use super::{frame, parse_text, Error};

/// Machine-readable prefix of `OK` and `CLOSED` messages (NIP-01).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessagePrefix {
  Duplicate,
  Pow,
  Blocked,
  RateLimited,
  Invalid,
  Error,
  AuthRequired,
  Restricted,
}

impl MessagePrefix {
  /// Prefix of `message`, if it starts with a known one.
  pub fn parse(message: &str) -> Option<Self> {
    let (prefix, _) = message.split_once(':')?;
    match prefix.trim() {
      "duplicate" => Some(Self::Duplicate),
      "pow" => Some(Self::Pow),
      "blocked" => Some(Self::Blocked),
      "rate-limited" => Some(Self::RateLimited),
      "invalid" => Some(Self::Invalid),
      "error" => Some(Self::Error),
      "auth-required" => Some(Self::AuthRequired),
      "restricted" => Some(Self::Restricted),
      _ => None,
    }
  }
}

impl fmt::Display for MessagePrefix {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Duplicate => write!(f, "duplicate"),
      Self::Pow => write!(f, "pow"),
      Self::Blocked => write!(f, "blocked"),
      Self::RateLimited => write!(f, "rate-limited"),
      Self::Invalid => write!(f, "invalid"),
      Self::Error => write!(f, "error"),
      Self::AuthRequired => write!(f, "auth-required"),
      Self::Restricted => write!(f, "restricted"),
    }
  }
}

/// `["OK", <event_id>, <true|false>, <message>]`: acknowledgement of an `EVENT` or `AUTH`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommOk {
  pub event_id: String,
  pub accepted: bool,
  pub message: String,
}

impl RelayToClientCommOk {
  pub fn new_ok(event_id: String, accepted: bool, message: String) -> Self {
    Self {
      event_id,
      accepted,
      message,
    }
  }

  pub fn prefix(&self) -> Option<MessagePrefix> {
    MessagePrefix::parse(&self.message)
  }

  pub fn as_value(&self) -> Value {
    json!(["OK", self.event_id, self.accepted, self.message])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Some relays omit the message; it defaults to an empty string.
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = frame(&msg, "OK", 3..=4)?;
    let event_id = v[1].as_str().ok_or(Error::InvalidData)?.to_string();
    let accepted = v[2].as_bool().ok_or(Error::InvalidData)?;
    let message = match v.get(3) {
      Some(message) => message.as_str().ok_or(Error::InvalidData)?.to_string(),
      None => String::new(),
    };
    Ok(Self::new_ok(event_id, accepted, message))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  #[test]
  fn test_relay_to_client_comm_ok() {
    let ok = RelayToClientCommOk::from_json(r#"["OK","abc",false,"auth-required: sign in first"]"#)
      .unwrap();
    assert_eq!(ok.event_id, "abc");
    assert!(!ok.accepted);
    assert_eq!(ok.prefix(), Some(MessagePrefix::AuthRequired));

    let short = RelayToClientCommOk::from_json(r#"["OK","abc",true]"#).unwrap();
    assert_eq!(short, RelayToClientCommOk::new_ok("abc".to_string(), true, String::new()));
    assert!(RelayToClientCommOk::from_json(r#"["OK","abc","true",""]"#).is_err());
  }

  #[test]
  fn prefixes() {
    for prefix in [
      MessagePrefix::Duplicate,
      MessagePrefix::Pow,
      MessagePrefix::Blocked,
      MessagePrefix::RateLimited,
      MessagePrefix::Invalid,
      MessagePrefix::Error,
      MessagePrefix::AuthRequired,
      MessagePrefix::Restricted,
    ] {
      assert_eq!(MessagePrefix::parse(&format!("{prefix}: detail")), Some(prefix));
    }
    assert_eq!(MessagePrefix::parse("no prefix here"), None);
    assert_eq!(MessagePrefix::parse("unknown: x"), None);
  }
}
