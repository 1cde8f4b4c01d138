use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::event::Event;

use super::{frame, parse_text, Error};

/// `["EVENT", <event JSON>]`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientToRelayCommEvent {
  pub event: Event,
}

impl ClientToRelayCommEvent {
  pub fn new_event(event: Event) -> Self {
    Self { event }
  }

  pub fn as_value(&self) -> Value {
    json!(["EVENT", self.event])
  }

  pub fn as_json(&self) -> String {
    self.as_value().to_string()
  }

  /// Reads the frame a client sends when publishing.
  pub fn from_value(msg: Value) -> Result<Self, Error> {
    let items = frame(&msg, "EVENT", 2)?;
    Ok(Self::new_event(Event::deserialize(&items[1])?))
  }

  pub fn from_json<S>(msg: S) -> Result<Self, Error>
  where
    S: Into<String>,
  {
    Self::from_value(parse_text(&msg.into())?)
  }
}

impl Serialize for ClientToRelayCommEvent {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    self.as_value().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for ClientToRelayCommEvent {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    Value::deserialize(deserializer)
      .and_then(|value| Self::from_value(value).map_err(serde::de::Error::custom))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn mock_event() -> Event {
    Event {
      id: String::from("05b25af3-4250-4fbf-8ef5-97220858f9ab"),
      content: String::from("hello"),
      ..Default::default()
    }
  }

  #[test]
  fn wraps_event_in_frame() {
    let event = mock_event();
    let expected = format!(r#"["EVENT",{}]"#, event.as_json());

    assert_eq!(ClientToRelayCommEvent::new_event(event).as_json(), expected);
  }

  #[test]
  fn reads_published_event() {
    let event = mock_event();
    let from_json = json!(["EVENT", event.as_value()]).to_string();

    let result = ClientToRelayCommEvent::from_json(from_json).unwrap();

    assert_eq!(result, ClientToRelayCommEvent::new_event(event));
  }

  #[test]
  fn rejects_other_frames() {
    assert!(ClientToRelayCommEvent::from_json("").is_err());
    assert!(ClientToRelayCommEvent::from_json(r#"["REQ","sub",{}]"#).is_err());
    assert!(ClientToRelayCommEvent::from_json(r#"["EVENT"]"#).is_err());
    assert!(serde_json::from_str::<ClientToRelayCommEvent>(r#"["EVENT",{"id":1}]"#).is_err());
  }
}
