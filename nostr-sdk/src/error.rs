//! Typed failure categories shared by every part of the crate.
//!
//! Per-relay failures are values (see [`crate::broadcast::RelayStatus`]),
//! only conditions that no retry can fix surface as an [`Error`] to the caller.

use std::fmt;

/// Coarse category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Configuration,
  Connection,
  Authentication,
  Validation,
  NotFound,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Configuration => write!(f, "configuration"),
      Self::Connection => write!(f, "connection"),
      Self::Authentication => write!(f, "authentication"),
      Self::Validation => write!(f, "validation"),
      Self::NotFound => write!(f, "not found"),
    }
  }
}

/// Bad relay URLs, unreadable relay lists, missing key material.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("invalid relay url `{url}`: {reason}")]
  InvalidRelayUrl { url: String, reason: String },
  #[error("relay list `{path}` could not be accessed: {source}")]
  RelayFile {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("environment variable {0} is not set")]
  MissingSecretKey(String),
  #[error("invalid secret key: {0}")]
  InvalidSecretKey(String),
  #[error("invalid value `{value}` for {name}")]
  InvalidSetting { name: String, value: String },
}

/// Anything that goes wrong on the wire with a single relay.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
  #[error("could not resolve {url}: {reason}")]
  Dns { url: String, reason: String },
  #[error("{url} is unreachable: {reason}")]
  Unreachable { url: String, reason: String },
  #[error("TLS handshake with {url} failed: {reason}")]
  Tls { url: String, reason: String },
  #[error("timed out while {stage} ({url})")]
  Timeout { url: String, stage: String },
  #[error("protocol violation from {url}: {reason}")]
  Protocol { url: String, reason: String },
  #[error("{url} is rate limiting us: {message}")]
  RateLimited { url: String, message: String },
  #[error("connection to {url} was closed")]
  Closed { url: String },
}

/// Failures of either authentication handshake.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
  #[error("relay did not send an AUTH challenge")]
  ChallengeMissing,
  #[error("invalid AUTH challenge: {0}")]
  ChallengeInvalid(String),
  #[error("relay did not acknowledge the AUTH event in time")]
  Timeout,
  #[error("relay rejected authentication: {0}")]
  Rejected(String),
  #[error("auth event signature is invalid")]
  InvalidSignature,
  #[error("auth event pubkey {actual} does not match {expected}")]
  PubkeyMismatch { expected: String, actual: String },
  #[error("auth event is {age} seconds away from now, outside the freshness window")]
  Expired { age: u64 },
  #[error("url tag mismatch: expected {expected}, got {actual}")]
  UrlMismatch { expected: String, actual: String },
  #[error("method tag mismatch: expected {expected}, got {actual}")]
  MethodMismatch { expected: String, actual: String },
  #[error("payload hash mismatch: expected {expected}, got {actual}")]
  PayloadMismatch { expected: String, actual: String },
  #[error("missing Authorization header")]
  MissingHeader,
  #[error("invalid Authorization header: {0}")]
  InvalidHeader(String),
  #[error("wrong auth event kind {0}")]
  WrongKind(u64),
  #[error("invalid url `{0}`")]
  InvalidUrl(String),
  #[error("invalid HTTP method `{0}`")]
  InvalidMethod(String),
  #[error("could not sign auth event: {0}")]
  Signing(String),
}

/// Malformed events, filters and ids.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
  #[error("malformed event: {0}")]
  MalformedEvent(String),
  #[error("event is missing its signature")]
  MissingSignature,
  #[error("event id does not match its content")]
  InvalidId,
  #[error("event signature does not verify")]
  InvalidSignature,
  #[error("invalid event id `{0}`")]
  InvalidEventId(String),
  #[error("filter has no conditions")]
  EmptyFilter,
  #[error("could not extract an event from the relay response: {0}")]
  Envelope(String),
  #[error("signing failed: {0}")]
  Signing(String),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

/// Crate level error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Connection(#[from] ConnectionError),
  #[error(transparent)]
  Auth(#[from] AuthError),
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error("event {0} was not found on any relay")]
  NotFound(String),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Config(_) => ErrorKind::Configuration,
      Self::Connection(_) => ErrorKind::Connection,
      Self::Auth(_) => ErrorKind::Authentication,
      Self::Validation(_) => ErrorKind::Validation,
      Self::NotFound(_) => ErrorKind::NotFound,
    }
  }

  /// Only network conditions can change between attempts.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Connection(_))
  }
}

pub type Result<T> = std::result::Result<T, Error>;
