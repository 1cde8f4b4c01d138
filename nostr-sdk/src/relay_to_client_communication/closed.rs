use serde_json::{json, Value};

use super::{frame, ok::MessagePrefix, parse_text, Error};

/// `["CLOSED", <subscription_id>, <message>]`: the relay refused or ended a subscription.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommClosed {
  pub subscription_id: String,
  pub message: String,
}

impl RelayToClientCommClosed {
  pub fn new_closed(subscription_id: String, message: String) -> Self {
    Self {
      subscription_id,
      message,
    }
  }

  pub fn prefix(&self) -> Option<MessagePrefix> {
    MessagePrefix::parse(&self.message)
  }

  pub fn as_value(&self) -> Value {
    json!(["CLOSED", self.subscription_id, self.message])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = frame(&msg, "CLOSED", 2..=3)?;
    let subscription_id = v[1].as_str().ok_or(Error::InvalidData)?.to_string();
    let message = match v.get(2) {
      Some(message) => message.as_str().ok_or(Error::InvalidData)?.to_string(),
      None => String::new(),
    };
    Ok(Self::new_closed(subscription_id, message))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}
