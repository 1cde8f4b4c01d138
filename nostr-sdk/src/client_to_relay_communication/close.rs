use serde_json::{json, Value};

use super::{frame, parse_text, Error};

/// `["CLOSE", <subscription_id>]`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommClose {
  pub subscription_id: String,
}

impl ClientToRelayCommClose {
  pub fn new(subscription_id: String) -> Self {
    Self { subscription_id }
  }

  pub fn as_value(&self) -> Value {
    json!(["CLOSE", self.subscription_id])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let items = frame(&msg, "CLOSE", 2)?;
    items[1]
      .as_str()
      .map(|id| Self::new(id.to_string()))
      .ok_or(Error::InvalidData)
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}
