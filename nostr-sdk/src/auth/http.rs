//! NIP-98 HTTP authentication.
//!
//! The client signs a kind 27235 event bound to the request URL, method and
//! (when there is a body) the body hash, and sends it base64 encoded as
//! `Authorization: Nostr <base64>`. The receiving side verifies the header
//! before doing any work.
//!
//! See: <https://github.com/nostr-protocol/nips/blob/master/98.md>

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use bitcoin_hashes::{sha256, Hash};
use url::Url;

use crate::error::AuthError;
use crate::event::{kind::EventKind, tag::Tag, tag::TagKind, timestamp_now, Event, Timestamp};
use crate::keys::{EventTemplate, Signer};

/// Authorization scheme of the header value.
pub const AUTH_SCHEME: &str = "Nostr";

/// Maximum distance, in seconds, between `created_at` and now.
pub const FRESHNESS_WINDOW: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
  Connect,
  Trace,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Head => "HEAD",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Patch => "PATCH",
      Self::Delete => "DELETE",
      Self::Options => "OPTIONS",
      Self::Connect => "CONNECT",
      Self::Trace => "TRACE",
    }
  }
}

impl FromStr for HttpMethod {
  type Err = AuthError;

  fn from_str(method: &str) -> Result<Self, Self::Err> {
    match method.trim().to_ascii_uppercase().as_str() {
      "GET" => Ok(Self::Get),
      "HEAD" => Ok(Self::Head),
      "POST" => Ok(Self::Post),
      "PUT" => Ok(Self::Put),
      "PATCH" => Ok(Self::Patch),
      "DELETE" => Ok(Self::Delete),
      "OPTIONS" => Ok(Self::Options),
      "CONNECT" => Ok(Self::Connect),
      "TRACE" => Ok(Self::Trace),
      _ => Err(AuthError::InvalidMethod(method.to_string())),
    }
  }
}

impl fmt::Display for HttpMethod {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Lowercase hex sha256 of a request body.
pub fn hash_payload(payload: &[u8]) -> String {
  sha256::Hash::hash(payload).to_string()
}

fn validate_url(url: &str) -> Result<(), AuthError> {
  let parsed = Url::parse(url).map_err(|_| AuthError::InvalidUrl(url.to_string()))?;
  let has_host = parsed.host_str().map(|host| !host.is_empty()).unwrap_or(false);
  if !matches!(parsed.scheme(), "http" | "https") || !has_host {
    return Err(AuthError::InvalidUrl(url.to_string()));
  }
  Ok(())
}

/// Signs a kind 27235 event for the request.
pub fn create_auth_event(
  signer: &dyn Signer,
  url: &str,
  method: &str,
  payload: Option<&[u8]>,
) -> Result<Event, AuthError> {
  validate_url(url)?;
  let method: HttpMethod = method.parse()?;

  let mut tags = vec![Tag::url(url), Tag::method(method.as_str())];
  if let Some(payload) = payload {
    tags.push(Tag::payload(&hash_payload(payload)));
  }

  signer
    .sign(EventTemplate::new(EventKind::HttpAuth, "", tags))
    .map_err(|err| AuthError::Signing(err.to_string()))
}

/// `Nostr <base64 of the signed event JSON>`
pub fn create_auth_header(
  signer: &dyn Signer,
  url: &str,
  method: &str,
  payload: Option<&[u8]>,
) -> Result<String, AuthError> {
  let event = create_auth_event(signer, url, method, payload)?;
  Ok(format!("{AUTH_SCHEME} {}", STANDARD.encode(event.as_json())))
}

/// Decodes the event carried by an `Authorization` header value.
pub fn parse_auth_header(header: Option<&str>) -> Result<Event, AuthError> {
  let header = match header.map(str::trim) {
    Some(header) if !header.is_empty() => header,
    _ => return Err(AuthError::MissingHeader),
  };

  let (scheme, encoded) = header
    .split_once(char::is_whitespace)
    .ok_or_else(|| AuthError::InvalidHeader("expected `Nostr <base64>`".to_string()))?;
  if scheme != AUTH_SCHEME {
    return Err(AuthError::InvalidHeader(format!(
      "expected scheme `{AUTH_SCHEME}`, got `{scheme}`"
    )));
  }

  let decoded = STANDARD
    .decode(encoded.trim())
    .map_err(|err| AuthError::InvalidHeader(format!("base64: {err}")))?;
  let json = String::from_utf8(decoded)
    .map_err(|err| AuthError::InvalidHeader(format!("utf-8: {err}")))?;

  Event::from_json(json).map_err(|err| AuthError::InvalidHeader(format!("event: {err}")))
}

/// Runs every check against `event` and returns all violations, in a fixed
/// order: kind, freshness, url, method, payload, signature.
pub fn check_auth_event(
  event: &Event,
  url: &str,
  method: &str,
  payload: Option<&[u8]>,
  now: Timestamp,
) -> Vec<AuthError> {
  let mut violations = Vec::new();

  if event.kind != EventKind::HttpAuth {
    violations.push(AuthError::WrongKind(event.kind.as_u64()));
  }

  let age = now.abs_diff(event.created_at);
  if age > FRESHNESS_WINDOW {
    violations.push(AuthError::Expired { age });
  }

  let tagged_url = event.first_tag_value(TagKind::Url).unwrap_or_default();
  if tagged_url != url {
    violations.push(AuthError::UrlMismatch {
      expected: url.to_string(),
      actual: tagged_url.to_string(),
    });
  }

  let tagged_method = event.first_tag_value(TagKind::Method).unwrap_or_default();
  let same_method = match (tagged_method.parse::<HttpMethod>(), method.parse::<HttpMethod>()) {
    (Ok(tagged), Ok(expected)) => tagged == expected,
    _ => false,
  };
  if !same_method {
    violations.push(AuthError::MethodMismatch {
      expected: method.to_string(),
      actual: tagged_method.to_string(),
    });
  }

  let expected_hash = payload.map(hash_payload);
  let tagged_hash = event.first_tag_value(TagKind::Payload).map(str::to_string);
  if expected_hash != tagged_hash {
    violations.push(AuthError::PayloadMismatch {
      expected: expected_hash.unwrap_or_else(|| "<none>".to_string()),
      actual: tagged_hash.unwrap_or_else(|| "<none>".to_string()),
    });
  }

  if !event.check_event_id() || !event.check_event_signature() {
    violations.push(AuthError::InvalidSignature);
  }

  violations
}

/// Verifies `event` for the request; the first violation is the error.
pub fn verify_auth_event(
  event: &Event,
  url: &str,
  method: &str,
  payload: Option<&[u8]>,
) -> Result<(), AuthError> {
  match check_auth_event(event, url, method, payload, timestamp_now())
    .into_iter()
    .next()
  {
    Some(err) => Err(err),
    None => Ok(()),
  }
}

/// Runs `handler` only when `header` authenticates the request. The handler
/// receives the verified auth event, e.g. to read the caller's pubkey.
pub fn authorize_request<F, T>(
  header: Option<&str>,
  url: &str,
  method: &str,
  body: Option<&[u8]>,
  handler: F,
) -> Result<T, AuthError>
where
  F: FnOnce(&Event) -> T,
{
  let event = parse_auth_header(header)?;
  if let Err(err) = verify_auth_event(&event, url, method, body) {
    log::warn!("[authorize_request] {method} {url} rejected: {err}");
    return Err(err);
  }
  Ok(handler(&event))
}
