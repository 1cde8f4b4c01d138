//! Key material and the signing capability used by every workflow.

use std::env;
use std::fmt;

use secp256k1::{KeyPair, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::error::{ConfigError, ValidationError};
use crate::event::{kind::EventKind, tag::Tag, timestamp_now, Event, PubKey, Timestamp};

/// Environment variable holding the signing key (`nsec1…` or hex).
pub const SECRET_KEY_ENV: &str = "NOSTR_SECRET_KEY";

static HRP_NSEC: bech32::Hrp = bech32::Hrp::parse_unchecked("nsec");
static HRP_NPUB: bech32::Hrp = bech32::Hrp::parse_unchecked("npub");

/// Unsigned event data handed in by publishers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTemplate {
  pub kind: EventKind,
  pub content: String,
  pub tags: Vec<Tag>,
  /// Defaults to now when signing.
  pub created_at: Option<Timestamp>,
}

impl EventTemplate {
  pub fn new<S>(kind: EventKind, content: S, tags: Vec<Tag>) -> Self
  where
    S: Into<String>,
  {
    Self {
      kind,
      content: content.into(),
      tags,
      created_at: None,
    }
  }

  pub fn created_at(mut self, created_at: Timestamp) -> Self {
    self.created_at = Some(created_at);
    self
  }
}

/// Anything able to turn an [`EventTemplate`] into a signed [`Event`].
pub trait Signer: Send + Sync {
  /// Hex encoded x-only public key.
  fn public_key(&self) -> PubKey;

  fn sign(&self, template: EventTemplate) -> Result<Event, ValidationError>;
}

/// secp256k1 key pair signing with BIP-340 Schnorr.
#[derive(Clone)]
pub struct Keys {
  keypair: KeyPair,
  public_key: XOnlyPublicKey,
}

impl Keys {
  pub fn new(secret_key: SecretKey) -> Self {
    let secp = Secp256k1::new();
    let keypair = KeyPair::from_secret_key(&secp, &secret_key);
    let (public_key, _) = XOnlyPublicKey::from_keypair(&keypair);
    Self {
      keypair,
      public_key,
    }
  }

  /// Random keys.
  pub fn generate() -> Self {
    let secp = Secp256k1::new();
    let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
    Self::new(secret_key)
  }

  /// Accepts a bech32 `nsec1…` string or 64 hex characters.
  pub fn from_secret_str(secret: &str) -> Result<Self, ConfigError> {
    let secret = secret.trim();
    let bytes = if secret.starts_with("nsec1") {
      let (hrp, data) = bech32::decode(secret)
        .map_err(|err| ConfigError::InvalidSecretKey(format!("invalid bech32: {err}")))?;
      if hrp != HRP_NSEC {
        return Err(ConfigError::InvalidSecretKey(format!(
          "unexpected prefix `{hrp}`"
        )));
      }
      data
    } else {
      hex::decode(secret)
        .map_err(|err| ConfigError::InvalidSecretKey(format!("invalid hex: {err}")))?
    };

    if bytes.len() != 32 {
      return Err(ConfigError::InvalidSecretKey(format!(
        "expected 32 bytes, got {}",
        bytes.len()
      )));
    }

    let secret_key = SecretKey::from_slice(&bytes)
      .map_err(|err| ConfigError::InvalidSecretKey(err.to_string()))?;
    Ok(Self::new(secret_key))
  }

  /// Reads [`SECRET_KEY_ENV`].
  pub fn from_env() -> Result<Self, ConfigError> {
    let secret = env::var(SECRET_KEY_ENV)
      .map_err(|_| ConfigError::MissingSecretKey(SECRET_KEY_ENV.to_string()))?;
    Self::from_secret_str(&secret)
  }

  pub fn public_key_hex(&self) -> String {
    self.public_key.to_string()
  }

  pub fn secret_key_hex(&self) -> String {
    hex::encode(self.keypair.secret_bytes())
  }

  pub fn npub(&self) -> Option<String> {
    bech32::encode::<bech32::Bech32>(HRP_NPUB, &self.public_key.serialize()).ok()
  }

  pub fn nsec(&self) -> Option<String> {
    bech32::encode::<bech32::Bech32>(HRP_NSEC, &self.keypair.secret_bytes()).ok()
  }
}

impl fmt::Debug for Keys {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Keys")
      .field("public_key", &self.public_key_hex())
      .finish_non_exhaustive()
  }
}

impl Signer for Keys {
  fn public_key(&self) -> PubKey {
    self.public_key_hex()
  }

  fn sign(&self, template: EventTemplate) -> Result<Event, ValidationError> {
    let created_at = template.created_at.unwrap_or_else(timestamp_now);
    let mut event = Event::new_without_signature(
      self.public_key_hex(),
      created_at,
      template.kind,
      template.tags,
      template.content,
    );
    event.sign_event(&self.keypair)?;
    Ok(event)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  const SECRET_HEX: &str = "3b940b5586823dfd02ae3b461bb4336b5ecbaefd6627aa922efc048fec0c881c";

  #[test]
  fn parses_hex_and_bech32_to_the_same_key() {
    let from_hex = Keys::from_secret_str(SECRET_HEX).unwrap();
    let nsec = from_hex.nsec().unwrap();
    assert!(nsec.starts_with("nsec1"));

    let from_bech32 = Keys::from_secret_str(&nsec).unwrap();
    assert_eq!(from_hex.public_key_hex(), from_bech32.public_key_hex());
    assert_eq!(from_bech32.secret_key_hex(), SECRET_HEX);
  }

  #[test]
  fn rejects_bad_secrets() {
    assert!(matches!(
      Keys::from_secret_str("abcd"),
      Err(ConfigError::InvalidSecretKey(_))
    ));
    assert!(matches!(
      Keys::from_secret_str("zz"),
      Err(ConfigError::InvalidSecretKey(_))
    ));
    assert!(matches!(
      Keys::from_secret_str(&"0".repeat(64)),
      Err(ConfigError::InvalidSecretKey(_))
    ));
    let npub = Keys::generate().npub().unwrap();
    assert!(Keys::from_secret_str(&npub).is_err());
  }

  #[test]
  fn debug_hides_secret() {
    let keys = Keys::from_secret_str(SECRET_HEX).unwrap();
    let printed = format!("{keys:?}");
    assert!(!printed.contains(SECRET_HEX));
    assert!(printed.contains(&keys.public_key_hex()));
  }

  #[test]
  fn signs_templates() {
    let keys = Keys::generate();
    let template = EventTemplate::new(EventKind::Wiki, "body", vec![Tag::identifier("page")])
      .created_at(1_700_000_000);

    let event = keys.sign(template).unwrap();

    assert_eq!(event.pubkey, keys.public_key());
    assert_eq!(event.created_at, 1_700_000_000);
    assert_eq!(event.kind, EventKind::Wiki);
    assert_eq!(event.identifier(), Some("page"));
    assert!(event.validate().is_ok());
  }
}
