/// The `client -> relay` communications.
///
///  - `["EVENT", event_JSON]`: used to publish events
///
///  - `["REQ", subscription_id, filters_JSON...]`: used to request events and subscribe to new updates.
///       A REQ message may contain multiple filters. In this case, events that match any of the filters are to be returned,
///       i.e., multiple filters are to be interpreted as `||` conditions.
///
///  - `["CLOSE", subscription_id]`: used to stop previous subscriptions. `subscription_id` is a random string used to represent a subscription.
///
///  - `["AUTH", auth_event_JSON]`: answer to a relay AUTH challenge (NIP-42).
///
// Internal `client_to_relay_communication` modules
pub mod auth;
pub mod close;
pub mod event;
pub mod request;

/// [`ClientToRelayCommunication`] error
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

/// Splits a raw frame into its elements, checking the label and element count.
pub(crate) fn frame<'a>(msg: &'a serde_json::Value, label: &str, len: usize) -> Result<&'a [serde_json::Value], Error> {
  match msg.as_array() {
    Some(items) if items.len() == len && items[0] == label => Ok(items),
    _ => Err(Error::InvalidData),
  }
}

/// Parses non-empty text into a JSON value.
pub(crate) fn parse_text(msg: &str) -> Result<serde_json::Value, Error> {
  if msg.trim().is_empty() {
    return Err(Error::InvalidData);
  }
  Ok(serde_json::from_str(msg)?)
}
