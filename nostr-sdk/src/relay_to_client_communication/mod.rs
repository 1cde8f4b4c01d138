use std::ops::RangeInclusive;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::event::Event;

// internal modules
pub mod auth;
pub mod closed;
pub mod eose;
pub mod event;
pub mod notice;
pub mod ok;

use self::{
  auth::RelayToClientCommAuth, closed::RelayToClientCommClosed, eose::RelayToClientCommEose,
  event::RelayToClientCommEvent, notice::RelayToClientCommNotice, ok::RelayToClientCommOk,
};

/// [`RelayToClientCommunication`] error
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// Error serializing or deserializing JSON data
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Invalid data")]
  InvalidData,
}

impl serde::de::Error for Error {
  fn custom<T>(_msg: T) -> Self
  where
    T: std::fmt::Display,
  {
    Self::InvalidData
  }
}

/// Checks the frame code and arity.
pub(crate) fn frame<'a>(
  msg: &'a Value,
  code: &str,
  arity: RangeInclusive<usize>,
) -> Result<&'a Vec<Value>, Error> {
  let v = msg.as_array().ok_or(Error::InvalidData)?;

  if !arity.contains(&v.len()) || v[0] != code {
    return Err(Error::InvalidData);
  }

  Ok(v)
}

/// Parses non-empty text into a JSON value.
pub(crate) fn parse_text(msg: &str) -> Result<Value, Error> {
  if msg.trim().is_empty() {
    return Err(Error::InvalidData);
  }
  Ok(serde_json::from_str(msg)?)
}

/// Any frame a relay can send us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
  Event(RelayToClientCommEvent),
  Eose(RelayToClientCommEose),
  Ok(RelayToClientCommOk),
  Notice(RelayToClientCommNotice),
  Auth(RelayToClientCommAuth),
  Closed(RelayToClientCommClosed),
}

impl RelayMessage {
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let code = msg
      .as_array()
      .and_then(|v| v.first())
      .and_then(Value::as_str)
      .ok_or(Error::InvalidData)?;

    match code {
      "EVENT" => Ok(Self::Event(RelayToClientCommEvent::from_value(msg)?)),
      "EOSE" => Ok(Self::Eose(RelayToClientCommEose::from_value(msg)?)),
      "OK" => Ok(Self::Ok(RelayToClientCommOk::from_value(msg)?)),
      "NOTICE" => Ok(Self::Notice(RelayToClientCommNotice::from_value(msg)?)),
      "AUTH" => Ok(Self::Auth(RelayToClientCommAuth::from_value(msg)?)),
      "CLOSED" => Ok(Self::Closed(RelayToClientCommClosed::from_value(msg)?)),
      _ => Err(Error::InvalidData),
    }
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }

  pub fn as_value(&self) -> Value {
    match self {
      Self::Event(frame) => frame.as_value(),
      Self::Eose(frame) => frame.as_value(),
      Self::Ok(frame) => frame.as_value(),
      Self::Notice(frame) => frame.as_value(),
      Self::Auth(frame) => frame.as_value(),
      Self::Closed(frame) => frame.as_value(),
    }
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// The event carried by an `EVENT` frame.
  pub fn event(&self) -> Option<&Event> {
    match self {
      Self::Event(frame) => Some(&frame.event),
      _ => None,
    }
  }

  pub fn into_event(self) -> Option<Event> {
    match self {
      Self::Event(frame) => Some(frame.event),
      _ => None,
    }
  }

  /// Subscription the frame belongs to, if any.
  pub fn subscription_id(&self) -> Option<&str> {
    match self {
      Self::Event(frame) => Some(&frame.subscription_id),
      Self::Eose(frame) => Some(&frame.subscription_id),
      Self::Closed(frame) => Some(&frame.subscription_id),
      _ => None,
    }
  }
}

impl Serialize for RelayMessage {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for RelayMessage {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let json_value: Value = Value::deserialize(deserializer)?;
    RelayMessage::from_value(json_value).map_err(serde::de::Error::custom)
  }
}
