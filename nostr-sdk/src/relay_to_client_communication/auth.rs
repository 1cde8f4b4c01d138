use serde_json::{json, Value};

use super::{frame, parse_text, Error};

/// `["AUTH", <challenge>]` (NIP-42).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommAuth {
  pub challenge: String,
}

impl RelayToClientCommAuth {
  pub fn new_challenge(challenge: String) -> Self {
    Self { challenge }
  }

  pub fn as_value(&self) -> Value {
    json!(["AUTH", self.challenge])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = frame(&msg, "AUTH", 2..=2)?;
    let challenge = v[1].as_str().ok_or(Error::InvalidData)?;
    Ok(Self::new_challenge(challenge.to_string()))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}
