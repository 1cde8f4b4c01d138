//! BIP-340 signatures over event ids.

use std::str::FromStr;

use bitcoin_hashes::{hex::FromHex, sha256};
use secp256k1::{schnorr, KeyPair, Message, Secp256k1, Signing, Verification, XOnlyPublicKey};

#[derive(thiserror::Error, Debug)]
pub enum SchnorrError {
  /// The digest is not 32 bytes of hex
  #[error("invalid digest: {0}")]
  Digest(#[from] bitcoin_hashes::hex::Error),

  #[error(transparent)]
  Secp256k1(#[from] secp256k1::Error),
}

fn digest(id: &str) -> Result<Message, SchnorrError> {
  let hash = sha256::Hash::from_hex(id)?;
  Ok(Message::from_slice(hash.as_ref())?)
}

/// Signs the hex event id `id`, without auxiliary randomness so the same
/// id and key always give the same signature.
///
/// ```
/// use bitcoin_hashes::{hex::ToHex, sha256, Hash};
/// use nostr_sdk::schnorr::sign_schnorr;
/// use secp256k1::{KeyPair, Secp256k1};
///
/// let secp = Secp256k1::new();
/// let keypair = KeyPair::new(&secp, &mut rand::thread_rng());
/// let id = sha256::Hash::hash(b"[0,\"...\"]").to_hex();
/// assert!(sign_schnorr(&secp, &id, &keypair).is_ok());
/// ```
pub fn sign_schnorr<C: Signing>(
  secp: &Secp256k1<C>,
  id: &str,
  keypair: &KeyPair,
) -> Result<schnorr::Signature, SchnorrError> {
  Ok(secp.sign_schnorr_no_aux_rand(&digest(id)?, keypair))
}

/// Checks the hex signature `sig` of event id `id` against the x-only `pubkey`.
pub fn verify_schnorr<C: Verification>(
  secp: &Secp256k1<C>,
  id: &str,
  sig: &str,
  pubkey: &str,
) -> Result<(), SchnorrError> {
  let sig = schnorr::Signature::from_str(sig)?;
  let pubkey = XOnlyPublicKey::from_str(pubkey)?;

  secp.verify_schnorr(&sig, &digest(id)?, &pubkey).map_err(|err| {
    log::debug!("[Schnorr] signature rejected for {id}: {err}");
    SchnorrError::Secp256k1(err)
  })
}
