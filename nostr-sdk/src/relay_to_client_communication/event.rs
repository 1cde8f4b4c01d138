use serde::Deserialize;
use serde_json::{json, Value};

use crate::event::Event;

use super::{frame, parse_text, Error};

/// `["EVENT", <subscription_id>, <event JSON>]`: an event matching a subscription.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommEvent {
  pub subscription_id: String,
  pub event: Event,
}

impl RelayToClientCommEvent {
  pub fn new_event(subscription_id: String, event: Event) -> Self {
    Self {
      subscription_id,
      event,
    }
  }

  pub fn as_value(&self) -> Value {
    json!(["EVENT", self.subscription_id, self.event])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let items = frame(&msg, "EVENT", 3..=3)?;
    let subscription_id = items[1].as_str().ok_or(Error::InvalidData)?;
    Ok(Self::new_event(subscription_id.to_string(), Event::deserialize(&items[2])?))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}
