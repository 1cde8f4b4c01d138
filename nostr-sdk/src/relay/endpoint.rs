use std::fmt;

use url::Url;

use crate::error::ConfigError;

/// A validated `ws://` or `wss://` relay address.
///
/// The address is kept as written (minus surrounding whitespace and a lone
/// trailing `/`) so results can be reported back with the caller's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayEndpoint {
  url: String,
}

impl RelayEndpoint {
  pub fn parse(raw: &str) -> Result<Self, ConfigError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ConfigError::InvalidRelayUrl {
      url: raw.to_string(),
      reason: reason.to_string(),
    };

    let parsed = Url::parse(trimmed).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
      return Err(invalid("scheme must be ws:// or wss://"));
    }
    match parsed.host_str() {
      Some(host) if !host.is_empty() => {}
      _ => return Err(invalid("missing host")),
    }

    let url = match trimmed.strip_suffix('/') {
      Some(stripped) if !stripped.ends_with('/') && parsed.path() == "/" => stripped,
      _ => trimmed,
    };

    Ok(Self {
      url: url.to_string(),
    })
  }

  pub fn parse_all<S: AsRef<str>>(urls: &[S]) -> Result<Vec<Self>, ConfigError> {
    urls.iter().map(|url| Self::parse(url.as_ref())).collect()
  }

  pub fn as_str(&self) -> &str {
    &self.url
  }

  /// Host and port to resolve before connecting.
  pub fn socket_addr(&self) -> Option<(String, u16)> {
    let parsed = Url::parse(&self.url).ok()?;
    let host = parsed.host_str()?.trim_matches(|c| c == '[' || c == ']').to_string();
    let port = parsed.port_or_known_default()?;
    Some((host, port))
  }
}

impl fmt::Display for RelayEndpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.url)
  }
}

/// Drops repeated endpoints, keeping the first occurrence.
pub fn dedup(endpoints: Vec<RelayEndpoint>) -> Vec<RelayEndpoint> {
  let mut unique: Vec<RelayEndpoint> = Vec::with_capacity(endpoints.len());
  for endpoint in endpoints {
    if !unique.contains(&endpoint) {
      unique.push(endpoint);
    }
  }
  unique
}
