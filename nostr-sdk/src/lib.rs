pub use env_logger::Env;
pub use log::{debug, error, info, warn};

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Installs `env_logger` once, `info` unless `RUST_LOG` says otherwise.
pub fn init_logger() {
  INIT_LOGGER.call_once(|| {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
  });
}

pub mod auth;
pub mod broadcast;
pub mod client_to_relay_communication;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod keys;
pub mod query;
pub mod relay;
pub mod relay_to_client_communication;
pub mod schnorr;
pub mod subscription;
pub mod workflows;

#[cfg(test)]
pub(crate) mod test_utils;

pub use self::broadcast::{BroadcastEngine, BroadcastOutcome, RelayResult, RelayStatus};
pub use self::config::Config;
pub use self::error::{Error, ErrorKind, Result};
pub use self::event::{kind::EventKind, tag::Tag, Event};
pub use self::filter::Filter;
pub use self::keys::{EventTemplate, Keys, Signer};
pub use self::query::{FetchResult, QueryEngine};
pub use self::relay::{RelayContext, RelayEndpoint, RelayInfoCache, RelaySelector};
pub use self::subscription::{Subscription, SubscriptionState};
pub use self::workflows::{
  DeleteReport, DeleteStage, DeleteStatus, FetchReport, LifecycleWorkflows, PublishResult,
};
