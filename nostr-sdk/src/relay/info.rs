use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::challenge::AuthState;

/// What we learned about a relay from talking to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayInfo {
  /// The relay asked for NIP-42 authentication at least once.
  pub auth_required: bool,
  /// State reached by the last authentication attempt.
  pub last_auth: Option<AuthState>,
  /// Number of `rate-limited:` answers seen.
  pub rate_limited: u32,
  pub last_notice: Option<String>,
}

/// Process wide relay capability cache, keyed by relay URL.
///
/// Cloning shares the underlying map, so one instance can be handed to
/// every engine and concurrent task.
#[derive(Debug, Clone, Default)]
pub struct RelayInfoCache {
  inner: Arc<Mutex<HashMap<String, RelayInfo>>>,
}

impl RelayInfoCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<String, RelayInfo>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn update<F: FnOnce(&mut RelayInfo)>(&self, url: &str, f: F) {
    let mut cache = self.lock();
    f(cache.entry(url.to_string()).or_default());
  }

  pub fn get(&self, url: &str) -> Option<RelayInfo> {
    self.lock().get(url).cloned()
  }

  pub fn requires_auth(&self, url: &str) -> bool {
    self.lock().get(url).map(|info| info.auth_required).unwrap_or(false)
  }

  pub fn mark_auth_required(&self, url: &str) {
    self.update(url, |info| info.auth_required = true);
  }

  pub fn record_auth(&self, url: &str, state: AuthState) {
    self.update(url, |info| info.last_auth = Some(state));
  }

  pub fn record_rate_limited(&self, url: &str) {
    self.update(url, |info| info.rate_limited += 1);
  }

  pub fn record_notice(&self, url: &str, notice: &str) {
    self.update(url, |info| info.last_notice = Some(notice.to_string()));
  }

  pub fn clear(&self) {
    self.lock().clear();
  }
}
