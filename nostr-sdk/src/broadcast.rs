//! Multi-relay publishing with bounded retries and a single default fallback.

use std::fmt;

use log::{debug, info, warn};
use tokio::time::{sleep, timeout, Duration};

use crate::config::{Config, DefaultRelays, RetryPolicy};
use crate::error::{ConnectionError, Error, ErrorKind};
use crate::event::{kind::EventKind, Event};
use crate::relay::{connection::RelayConnection, RelayContext, RelayEndpoint};

const DELETION_ADVICE: &str =
  "some relays refuse deletion events or only accept them when signed by the original author's key";

/// What one relay did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
  /// `OK true`, with the relay's message (e.g. `duplicate: ...`).
  Accepted { message: String },
  /// `OK false`.
  Rejected { message: String },
  /// No verdict: connection, timeout or authentication failure.
  Failed { kind: ErrorKind, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResult {
  pub url: String,
  pub status: RelayStatus,
}

impl RelayResult {
  pub fn is_accepted(&self) -> bool {
    matches!(self.status, RelayStatus::Accepted { .. })
  }
}

impl fmt::Display for RelayResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.status {
      RelayStatus::Accepted { .. } => write!(f, "{}: accepted", self.url),
      RelayStatus::Rejected { message } => write!(f, "{}: rejected ({message})", self.url),
      RelayStatus::Failed { kind, reason } => write!(f, "{}: {kind} error ({reason})", self.url),
    }
  }
}

/// Aggregate result of [`BroadcastEngine::send_with_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastOutcome {
  pub event_id: String,
  pub success: bool,
  /// In input order.
  pub successful_relays: Vec<String>,
  pub failed_relays: Vec<String>,
  /// Rounds run against the caller's relay set.
  pub attempts: u32,
  pub used_fallback: bool,
  /// Per-relay detail of the last round, plus the fallback when used.
  pub relay_results: Vec<RelayResult>,
  pub message: String,
}

impl BroadcastOutcome {
  fn from_results(
    event: &Event,
    attempts: u32,
    used_fallback: bool,
    relay_results: Vec<RelayResult>,
  ) -> Self {
    let (accepted, failed): (Vec<&RelayResult>, Vec<&RelayResult>) =
      relay_results.iter().partition(|result| result.is_accepted());
    let successful_relays: Vec<String> = accepted.iter().map(|result| result.url.clone()).collect();
    let failed_relays: Vec<String> = failed.iter().map(|result| result.url.clone()).collect();
    let success = !successful_relays.is_empty();

    let mut message = if success {
      format!(
        "published {} to {} relay(s)",
        event.id,
        successful_relays.len()
      )
    } else {
      format!(
        "no relay accepted {}: {}",
        event.id,
        failed.iter().map(|result| result.to_string()).collect::<Vec<_>>().join("; ")
      )
    };
    if !success && event.kind == EventKind::Deletion {
      message.push_str(&format!(" ({DELETION_ADVICE})"));
    }

    Self {
      event_id: event.id.clone(),
      success,
      successful_relays,
      failed_relays,
      attempts,
      used_fallback,
      relay_results,
      message,
    }
  }
}

/// Publishes signed events to a set of relays, one task per relay.
#[derive(Debug, Clone)]
pub struct BroadcastEngine {
  retry: RetryPolicy,
  defaults: DefaultRelays,
  ctx: RelayContext,
}

impl BroadcastEngine {
  pub fn new(config: &Config, ctx: RelayContext) -> Self {
    Self {
      retry: config.retry,
      defaults: config.default_relays.clone(),
      ctx,
    }
  }

  /// Upper bound for a single relay: connect, one auth handshake, two sends.
  fn relay_budget(&self) -> Duration {
    let timeouts = &self.ctx.timeouts;
    timeouts.connect + timeouts.challenge + timeouts.auth_ok + timeouts.response * 2
  }

  /// Validates `event`, then publishes it.
  ///
  /// Up to `max_attempts` rounds run against `relays` with a backoff in
  /// between; the first round where any relay accepts ends the call. When
  /// every round fails, one send goes to the kind's default relay. Per-relay
  /// failures never surface as `Err`: only an invalid event or an invalid
  /// default relay does.
  pub async fn send_with_retry(
    &self,
    event: &Event,
    relays: &[RelayEndpoint],
  ) -> Result<BroadcastOutcome, Error> {
    event.validate()?;
    self.send_prepared(event, relays).await
  }

  /// [`Self::send_with_retry`] without the local validation step.
  pub(crate) async fn send_prepared(
    &self,
    event: &Event,
    relays: &[RelayEndpoint],
  ) -> Result<BroadcastOutcome, Error> {
    let mut attempts = 0;
    let mut last_round = Vec::new();

    if relays.is_empty() {
      info!("[BroadcastEngine] no relays given for {}, using the default relay", event.id);
    }

    if !relays.is_empty() {
      for attempt in 1..=self.retry.max_attempts.max(1) {
        if attempt > 1 {
          info!(
            "[BroadcastEngine] retrying {} in {:?} (attempt {attempt}/{})",
            event.id, self.retry.backoff, self.retry.max_attempts
          );
          sleep(self.retry.backoff).await;
        }
        attempts = attempt;

        last_round = self.dispatch(event, relays).await;
        if last_round.iter().any(RelayResult::is_accepted) {
          let outcome = BroadcastOutcome::from_results(event, attempts, false, last_round);
          info!("[BroadcastEngine] {}", outcome.message);
          return Ok(outcome);
        }
        warn!(
          "[BroadcastEngine] attempt {attempt} for {}: no relay accepted",
          event.id
        );
      }
    }

    let fallback = RelayEndpoint::parse(self.defaults.single(event.kind))?;
    info!("[BroadcastEngine] falling back to {fallback} for {}", event.id);
    let fallback_result = self.dispatch(event, std::slice::from_ref(&fallback)).await;
    let accepted = fallback_result.iter().any(RelayResult::is_accepted);
    last_round.extend(fallback_result);

    let outcome = BroadcastOutcome::from_results(event, attempts, true, last_round);
    if accepted {
      info!("[BroadcastEngine] {}", outcome.message);
    } else {
      warn!("[BroadcastEngine] {}", outcome.message);
    }
    Ok(outcome)
  }

  /// One round: every relay concurrently, results in input order.
  async fn dispatch(&self, event: &Event, relays: &[RelayEndpoint]) -> Vec<RelayResult> {
    let budget = self.relay_budget();
    let tasks: Vec<_> = relays
      .iter()
      .map(|endpoint| {
        let endpoint = endpoint.clone();
        let event = event.clone();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
          let url = endpoint.to_string();
          match timeout(budget, publish_once(&endpoint, &event, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(
              ConnectionError::Timeout {
                url,
                stage: "publishing".to_string(),
              }
              .into(),
            ),
          }
        })
      })
      .collect();

    let mut results = Vec::with_capacity(tasks.len());
    for (endpoint, task) in relays.iter().zip(tasks) {
      let status = match task.await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => RelayStatus::Failed {
          kind: err.kind(),
          reason: err.to_string(),
        },
        Err(err) => RelayStatus::Failed {
          kind: ErrorKind::Connection,
          reason: format!("relay task aborted: {err}"),
        },
      };
      match &status {
        RelayStatus::Accepted { .. } => debug!("[BroadcastEngine] {endpoint} accepted {}", event.id),
        RelayStatus::Rejected { message } => {
          warn!("[BroadcastEngine] {endpoint} rejected {}: {message}", event.id)
        }
        RelayStatus::Failed { reason, .. } => {
          warn!("[BroadcastEngine] {endpoint} failed for {}: {reason}", event.id)
        }
      }
      results.push(RelayResult {
        url: endpoint.to_string(),
        status,
      });
    }
    results
  }
}

async fn publish_once(
  endpoint: &RelayEndpoint,
  event: &Event,
  ctx: RelayContext,
) -> Result<RelayStatus, Error> {
  let mut connection = RelayConnection::connect(endpoint, ctx).await?;
  let ok = connection.publish(event).await;
  connection.close().await;
  let ok = ok?;

  Ok(if ok.accepted {
    RelayStatus::Accepted { message: ok.message }
  } else {
    RelayStatus::Rejected { message: ok.message }
  })
}
