use std::sync::Arc;

use crate::config::Timeouts;
use crate::keys::Signer;

// Relay Modules
pub mod connection;
pub mod endpoint;
pub mod info;
pub mod selector;

pub use self::endpoint::RelayEndpoint;
pub use self::info::{RelayInfo, RelayInfoCache};
pub use self::selector::RelaySelector;

/// What every per-relay task needs: timeouts, the shared capability cache
/// and, when NIP-42 is possible, a signer.
#[derive(Clone)]
pub struct RelayContext {
  pub timeouts: Timeouts,
  pub info: RelayInfoCache,
  pub signer: Option<Arc<dyn Signer>>,
}

impl RelayContext {
  pub fn new(timeouts: Timeouts, info: RelayInfoCache, signer: Option<Arc<dyn Signer>>) -> Self {
    Self {
      timeouts,
      info,
      signer,
    }
  }
}

impl std::fmt::Debug for RelayContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RelayContext")
      .field("timeouts", &self.timeouts)
      .field("info", &self.info)
      .field("signer", &self.signer.as_ref().map(|signer| signer.public_key()))
      .finish()
  }
}
