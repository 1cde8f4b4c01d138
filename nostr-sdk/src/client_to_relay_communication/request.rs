use serde_json::{json, Value};

use crate::filter::Filter;

use super::Error;

/// `["REQ", <subscription_id>, <filter JSON>...]`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommRequest {
  pub subscription_id: String,
  pub filters: Vec<Filter>,
}

impl ClientToRelayCommRequest {
  pub fn new(subscription_id: String, filters: Vec<Filter>) -> Self {
    Self {
      subscription_id,
      filters,
    }
  }

  /// Serialize as [`Value`]
  pub fn as_value(&self) -> Value {
    let mut frame = vec![json!("REQ"), json!(self.subscription_id)];
    frame.extend(self.filters.iter().map(|filter| json!(filter)));
    Value::Array(frame)
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Deserialize from [`Value`]
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let v = msg.as_array().ok_or(Error::InvalidData)?;

    if v.len() < 3 || v[0] != "REQ" {
      return Err(Error::InvalidData);
    }

    let subscription_id = v[1].as_str().ok_or(Error::InvalidData)?.to_string();
    let filters = v[2..]
      .iter()
      .map(|filter| serde_json::from_value(filter.clone()).map_err(Error::Json))
      .collect::<Result<Vec<Filter>, Error>>()?;

    Ok(Self::new(subscription_id, filters))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    let msg: &str = &msg.into();
    if msg.is_empty() {
      return Err(Error::InvalidData);
    }
    Self::from_value(serde_json::from_str(msg)?)
  }
}
