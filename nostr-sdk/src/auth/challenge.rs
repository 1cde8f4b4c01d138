//! NIP-42 challenge-response authentication.
//!
//! A relay sends `["AUTH", <challenge>]`; the client answers with a signed,
//! ephemeral kind 22242 event tagged with the relay URL and the challenge,
//! and the relay acknowledges it with an `OK`.

use crate::error::AuthError;
use crate::event::{kind::EventKind, tag::Tag, Event};
#[cfg(test)]
use crate::event::{tag::TagKind, timestamp_now};
use crate::keys::{EventTemplate, Signer};

/// How far `created_at` of an auth event may drift from the relay clock.
pub const CLIENT_AUTH_WINDOW: u64 = 600;

/// Authentication state of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
  #[default]
  Connected,
  AwaitingChallenge,
  Authenticating {
    event_id: String,
  },
  Authenticated,
  Failed(AuthError),
}

/// Per-connection challenge bookkeeping. Each challenge is answered at
/// most once; dropping the connection drops the session with it.
#[derive(Debug, Default)]
pub struct ChallengeSession {
  state: AuthState,
  pending: Option<String>,
  answered: Option<String>,
}

impl ChallengeSession {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> &AuthState {
    &self.state
  }

  pub fn is_authenticated(&self) -> bool {
    self.state == AuthState::Authenticated
  }

  /// Stores a challenge sent by the relay. Returns `false` when it is the
  /// one we already answered.
  pub fn receive_challenge(&mut self, challenge: String) -> bool {
    if self.answered.as_deref() == Some(challenge.as_str()) {
      return false;
    }
    self.pending = Some(challenge);
    true
  }

  pub fn has_pending(&self) -> bool {
    self.pending.is_some()
  }

  pub fn await_challenge(&mut self) {
    self.state = AuthState::AwaitingChallenge;
  }

  /// Consumes the pending challenge and moves to `Authenticating`.
  pub fn begin(&mut self, event_id: String) -> Option<String> {
    let challenge = self.pending.take()?;
    self.answered = Some(challenge.clone());
    self.state = AuthState::Authenticating { event_id };
    Some(challenge)
  }

  /// Peeks at the pending challenge without consuming it.
  pub fn pending(&self) -> Option<&str> {
    self.pending.as_deref()
  }

  /// The id of the auth event waiting for its `OK`.
  pub fn awaiting_ok(&self) -> Option<&str> {
    match &self.state {
      AuthState::Authenticating { event_id } => Some(event_id),
      _ => None,
    }
  }

  pub fn finish(&mut self, result: Result<(), AuthError>) -> Result<(), AuthError> {
    self.state = match &result {
      Ok(()) => AuthState::Authenticated,
      Err(err) => AuthState::Failed(err.clone()),
    };
    result
  }

  pub fn fail(&mut self, err: AuthError) -> AuthError {
    self.state = AuthState::Failed(err.clone());
    err
  }
}

/// Builds and signs the kind 22242 answer to `challenge`.
pub fn build_auth_event(
  signer: &dyn Signer,
  relay_url: &str,
  challenge: &str,
) -> Result<Event, AuthError> {
  if challenge.trim().is_empty() {
    return Err(AuthError::ChallengeInvalid("empty challenge".to_string()));
  }

  let template = EventTemplate::new(
    EventKind::ClientAuth,
    "",
    vec![Tag::relay(relay_url), Tag::challenge(challenge)],
  );

  signer
    .sign(template)
    .map_err(|err| AuthError::Signing(err.to_string()))
}

#[cfg(test)]
fn same_relay(a: &str, b: &str) -> bool {
  a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Relay side check of an `AUTH` answer, as the in-process test relay runs it.
#[cfg(test)]
pub(crate) fn verify_auth_event(event: &Event, relay_url: &str, challenge: &str) -> Result<(), AuthError> {
  if event.kind != EventKind::ClientAuth {
    return Err(AuthError::WrongKind(event.kind.as_u64()));
  }

  match event.first_tag_value(TagKind::Challenge) {
    Some(value) if value == challenge => {}
    Some(value) => return Err(AuthError::ChallengeInvalid(value.to_string())),
    None => return Err(AuthError::ChallengeInvalid("missing challenge tag".to_string())),
  }

  let relay = event.first_tag_value(TagKind::Relay).unwrap_or_default();
  if !same_relay(relay, relay_url) {
    return Err(AuthError::UrlMismatch {
      expected: relay_url.to_string(),
      actual: relay.to_string(),
    });
  }

  let age = timestamp_now().abs_diff(event.created_at);
  if age > CLIENT_AUTH_WINDOW {
    return Err(AuthError::Expired { age });
  }

  if !event.check_event_id() || !event.check_event_signature() {
    return Err(AuthError::InvalidSignature);
  }

  Ok(())
}
