use serde::Deserialize;
use serde_json::{json, Value};

use super::{frame, parse_text, Error};

/// `["EOSE", <subscription_id>]`: stored events for the subscription are exhausted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommEose {
  pub subscription_id: String,
}

impl RelayToClientCommEose {
  pub fn new_eose(subscription_id: String) -> Self {
    Self { subscription_id }
  }

  pub fn as_value(&self) -> Value {
    json!(["EOSE", self.subscription_id])
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let items = frame(&msg, "EOSE", 2..=2)?;
    Ok(Self::new_eose(String::deserialize(&items[1])?))
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}
