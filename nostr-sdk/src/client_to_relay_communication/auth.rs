use serde::Deserialize;
use serde_json::{json, Value};

use crate::event::Event;

use super::{frame, parse_text, Error};

/// `["AUTH", <signed kind 22242 event>]`, the answer to a relay challenge.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommAuth {
  pub event: Event,
}

impl ClientToRelayCommAuth {
  pub fn new(event: Event) -> Self {
    Self { event }
  }

  pub fn as_value(&self) -> Value {
    json!(["AUTH", self.event])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let items = frame(&msg, "AUTH", 2)?;
    // the relay side of the frame carries a plain string
    if !items[1].is_object() {
      return Err(Error::InvalidData);
    }
    Ok(Self::new(Event::deserialize(&items[1])?))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}
