//! Runtime configuration.
//!
//! Every delay and timeout used by the engines lives here so tests can
//! shrink them; `Config::default()` carries the production values.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::event::kind::EventKind;

/// Path of the user relay list.
pub const RELAYS_FILE_ENV: &str = "NOSTR_RELAYS_FILE";
pub const CONNECT_TIMEOUT_ENV: &str = "NOSTR_CONNECT_TIMEOUT_SECS";
pub const RESPONSE_TIMEOUT_ENV: &str = "NOSTR_RESPONSE_TIMEOUT_SECS";
pub const FETCH_TIMEOUT_ENV: &str = "NOSTR_FETCH_TIMEOUT_SECS";

/// Local development relay appended to both fan-out sets.
pub const LOCAL_RELAY: &str = "ws://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
  /// TCP + TLS + websocket handshake.
  pub connect: Duration,
  /// Waiting for `OK` after an `EVENT`, or for `EOSE` after a `REQ`.
  pub response: Duration,
  /// Waiting for an `AUTH` challenge.
  pub challenge: Duration,
  /// Waiting for the `OK` answering our `AUTH`.
  pub auth_ok: Duration,
  /// Whole fetch-by-id round.
  pub fetch: Duration,
}

impl Default for Timeouts {
  fn default() -> Self {
    Self {
      connect: Duration::from_secs(10),
      response: Duration::from_secs(10),
      challenge: Duration::from_secs(10),
      auth_ok: Duration::from_secs(5),
      fetch: Duration::from_secs(15),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total rounds against the full relay set, first one included.
  pub max_attempts: u32,
  /// Pause between two rounds.
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: Duration::from_secs(5),
    }
  }
}

/// Hard-coded relays used when the caller gave none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRelays {
  /// Single default for kind 1 notes.
  pub text: String,
  /// Single default for every other kind.
  pub document: String,
  /// Fan-out set for kind 1 notes.
  pub text_set: Vec<String>,
  /// Fan-out set for every other kind.
  pub document_set: Vec<String>,
}

impl DefaultRelays {
  pub fn single(&self, kind: EventKind) -> &str {
    match kind {
      EventKind::Text => &self.text,
      _ => &self.document,
    }
  }

  pub fn set(&self, kind: EventKind) -> &[String] {
    match kind {
      EventKind::Text => &self.text_set,
      _ => &self.document_set,
    }
  }
}

impl Default for DefaultRelays {
  fn default() -> Self {
    let text_set = [
      "wss://relay.damus.io",
      "wss://nos.lol",
      "wss://relay.nostr.band",
      "wss://relay.primal.net",
      "wss://nostr.wine",
      "wss://relay.snort.social",
      "wss://nostr.mom",
      "wss://purplepag.es",
      "wss://offchain.pub",
      LOCAL_RELAY,
    ];
    let document_set = [
      "wss://thecitadel.nostr1.com",
      "wss://theforest.nostr1.com",
      "wss://relay.wikifreedia.xyz",
      "wss://relay.damus.io",
      "wss://nos.lol",
      "wss://relay.nostr.band",
      "wss://relay.primal.net",
      "wss://nostr.land",
      "wss://aggr.nostr.land",
      LOCAL_RELAY,
    ];

    Self {
      text: "wss://relay.damus.io".to_string(),
      document: "wss://thecitadel.nostr1.com".to_string(),
      text_set: text_set.iter().map(|url| url.to_string()).collect(),
      document_set: document_set.iter().map(|url| url.to_string()).collect(),
    }
  }
}

/// What republishing does when the fetched envelope does not hold a
/// verifiable event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RepublishFallback {
  /// Fail with a validation error.
  #[default]
  Strict,
  /// Rebuild the event from whatever fields could be read and send that.
  Minimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub relays_file: PathBuf,
  pub timeouts: Timeouts,
  pub retry: RetryPolicy,
  pub default_relays: DefaultRelays,
  /// Pause between broadcasting a deletion and checking for it.
  pub settle_delay: Duration,
  pub republish_fallback: RepublishFallback,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      relays_file: default_relays_file(env::var("HOME").ok()),
      timeouts: Timeouts::default(),
      retry: RetryPolicy::default(),
      default_relays: DefaultRelays::default(),
      settle_delay: Duration::from_secs(3),
      republish_fallback: RepublishFallback::default(),
    }
  }
}

fn default_relays_file(home: Option<String>) -> PathBuf {
  match home {
    Some(home) if !home.is_empty() => PathBuf::from(home).join(".nostr").join("relays"),
    _ => PathBuf::from("relays"),
  }
}

fn seconds(
  name: &str,
  value: Option<String>,
  default: Duration,
) -> Result<Duration, ConfigError> {
  match value {
    Some(value) => value
      .trim()
      .parse::<u64>()
      .map(Duration::from_secs)
      .map_err(|_| ConfigError::InvalidSetting {
        name: name.to_string(),
        value,
      }),
    None => Ok(default),
  }
}

impl Config {
  /// Loads `.env` (if any) and applies the environment overrides.
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenv::dotenv().ok();
    Self::from_vars(|name| env::var(name).ok())
  }

  fn from_vars<F>(var: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self {
      relays_file: default_relays_file(var("HOME")),
      ..Default::default()
    };

    if let Some(path) = var(RELAYS_FILE_ENV).filter(|path| !path.trim().is_empty()) {
      config.relays_file = PathBuf::from(path.trim());
    }

    let timeouts = &mut config.timeouts;
    timeouts.connect = seconds(CONNECT_TIMEOUT_ENV, var(CONNECT_TIMEOUT_ENV), timeouts.connect)?;
    timeouts.response = seconds(RESPONSE_TIMEOUT_ENV, var(RESPONSE_TIMEOUT_ENV), timeouts.response)?;
    timeouts.fetch = seconds(FETCH_TIMEOUT_ENV, var(FETCH_TIMEOUT_ENV), timeouts.fetch)?;

    log::debug!("[Config] relays file: {}", config.relays_file.display());
    Ok(config)
  }

  pub fn with_relays_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.relays_file = path.into();
    self
  }
}
