use serde_json::{json, Value};

use super::{frame, parse_text, Error};

/// `["NOTICE", <message>]`: human-readable message from the relay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayToClientCommNotice {
  pub message: String,
}

impl RelayToClientCommNotice {
  pub fn new_notice(message: String) -> Self {
    Self { message }
  }

  pub fn as_value(&self) -> Value {
    json!(["NOTICE", self.message])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = frame(&msg, "NOTICE", 2..=2)?;
    let message = v[1].as_str().ok_or(Error::InvalidData)?;
    Ok(Self::new_notice(message.to_string()))
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
  fn test_relay_to_client_comm_notice() {
    let notice = RelayToClientCommNotice::from_json(r#"["NOTICE","slow down"]"#).unwrap();
    assert_eq!(notice.message, "slow down");
    assert_eq!(notice.as_json(), r#"["NOTICE","slow down"]"#);
  }
}
