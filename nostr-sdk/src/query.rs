//! Reading from relays: fetch by id, filtered queries and subscriptions.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Duration, Instant};

use crate::client_to_relay_communication::{
  close::ClientToRelayCommClose, request::ClientToRelayCommRequest,
};
use crate::config::{Config, DefaultRelays};
use crate::error::{AuthError, ConnectionError, Error, ValidationError};
use crate::event::{id::EventId, kind::EventKind, Event};
use crate::filter::Filter;
use crate::relay::connection::{RawFrame, RelayConnection};
use crate::relay::{RelayContext, RelayEndpoint};
use crate::relay_to_client_communication::{
  closed::RelayToClientCommClosed, ok::MessagePrefix, RelayMessage,
};
use crate::subscription::Subscription;

/// Outcome of [`QueryEngine::fetch_by_id`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
  pub id: String,
  /// Event of the first matching relay in input order, when it parsed.
  pub event: Option<Event>,
  /// The `["EVENT", ...]` frame that carried the first match, verbatim.
  pub raw_response: Option<String>,
  /// Every relay that had the event, in input order.
  pub found_on: Vec<String>,
  pub queried: Vec<String>,
  /// Relays that errored or timed out.
  pub failed: Vec<String>,
  pub used_fallback: bool,
}

impl FetchResult {
  pub fn is_found(&self) -> bool {
    !self.found_on.is_empty()
  }
}

enum Lookup {
  Missing,
  Found { raw: String, event: Option<Event> },
}

/// Recognises the frame carrying `id`, even when the event inside does
/// not deserialize.
fn match_frame(frame: &RawFrame, id: &str) -> Option<Lookup> {
  match &frame.message {
    Some(RelayMessage::Event(message)) if message.event.id == id => Some(Lookup::Found {
      raw: frame.text.clone(),
      event: Some(message.event.clone()),
    }),
    Some(_) => None,
    None => {
      let value: Value = serde_json::from_str(&frame.text).ok()?;
      let parts = value.as_array()?;
      let carries_id = parts.first().and_then(Value::as_str) == Some("EVENT")
        && parts.get(2).and_then(|event| event.get("id")).and_then(Value::as_str) == Some(id);
      carries_id.then(|| Lookup::Found {
        raw: frame.text.clone(),
        event: None,
      })
    }
  }
}

fn closed_error(url: &str, closed: &RelayToClientCommClosed) -> Error {
  match closed.prefix() {
    Some(MessagePrefix::AuthRequired) => AuthError::Rejected(closed.message.clone()).into(),
    Some(MessagePrefix::RateLimited) => ConnectionError::RateLimited {
      url: url.to_string(),
      message: closed.message.clone(),
    }
    .into(),
    _ => ConnectionError::Protocol {
      url: url.to_string(),
      reason: format!("subscription closed: {}", closed.message),
    }
    .into(),
  }
}

/// Sends the `REQ` and feeds frames of that subscription to `on_frame`
/// until `EOSE`, or until `on_frame` returns `true`. A `CLOSED
/// "auth-required: ..."` triggers one handshake and one resend.
async fn read_stored<F>(
  connection: &mut RelayConnection,
  request: &ClientToRelayCommRequest,
  deadline: Option<Instant>,
  mut on_frame: F,
) -> Result<(), Error>
where
  F: FnMut(&RawFrame) -> bool,
{
  connection.preflight_auth().await?;
  connection.send_json(request.as_json()).await?;

  let subscription_id = request.subscription_id.as_str();
  let mut resent = false;
  loop {
    let frame = connection.recv_raw(deadline, "waiting for EOSE").await?;
    match &frame.message {
      Some(RelayMessage::Event(message)) if message.subscription_id == subscription_id => {
        if on_frame(&frame) {
          return Ok(());
        }
      }
      None => {
        if on_frame(&frame) {
          return Ok(());
        }
      }
      Some(RelayMessage::Eose(eose)) if eose.subscription_id == subscription_id => return Ok(()),
      Some(RelayMessage::Closed(closed)) if closed.subscription_id == subscription_id => {
        if !resent && connection.should_authenticate(closed.prefix()) {
          connection.authenticate().await?;
          connection.send_json(request.as_json()).await?;
          resent = true;
          continue;
        }
        return Err(closed_error(connection.endpoint().as_str(), closed));
      }
      Some(other) => debug!(
        "[QueryEngine] ignoring {} from {}",
        other.as_json(),
        connection.endpoint()
      ),
    }
  }
}

fn new_subscription_id() -> String {
  uuid::Uuid::new_v4().to_string()
}

async fn lookup_relay(
  endpoint: RelayEndpoint,
  id: String,
  ctx: RelayContext,
  deadline: Instant,
) -> Result<Lookup, Error> {
  let mut connection = RelayConnection::connect(&endpoint, ctx).await?;
  let request = ClientToRelayCommRequest::new(new_subscription_id(), vec![Filter::new().id(id.as_str())]);

  let mut lookup = Lookup::Missing;
  let result = read_stored(&mut connection, &request, Some(deadline), |frame| {
    match match_frame(frame, &id) {
      Some(found) => {
        lookup = found;
        true
      }
      None => false,
    }
  })
  .await;

  if result.is_ok() {
    let close = ClientToRelayCommClose::new(request.subscription_id.clone()).as_json();
    if let Err(err) = connection.send_json(close).await {
      debug!("[QueryEngine] CLOSE to {endpoint} failed: {err}");
    }
  }
  connection.close().await;

  match (result, lookup) {
    (_, Lookup::Found { raw, event }) => Ok(Lookup::Found { raw, event }),
    (Ok(()), Lookup::Missing) => Ok(Lookup::Missing),
    (Err(err), Lookup::Missing) => Err(err),
  }
}

async fn collect_relay(
  endpoint: RelayEndpoint,
  filter: Filter,
  ctx: RelayContext,
  deadline: Instant,
) -> (Vec<Event>, Option<Error>) {
  let mut connection = match RelayConnection::connect(&endpoint, ctx).await {
    Ok(connection) => connection,
    Err(err) => return (Vec::new(), Some(err.into())),
  };
  let request = ClientToRelayCommRequest::new(new_subscription_id(), vec![filter]);

  let mut events = Vec::new();
  let result = read_stored(&mut connection, &request, Some(deadline), |frame| {
    if let Some(RelayMessage::Event(message)) = &frame.message {
      events.push(message.event.clone());
    }
    false
  })
  .await;

  if result.is_ok() {
    let close = ClientToRelayCommClose::new(request.subscription_id.clone()).as_json();
    if let Err(err) = connection.send_json(close).await {
      debug!("[QueryEngine] CLOSE to {endpoint} failed: {err}");
    }
  }
  connection.close().await;
  (events, result.err())
}

/// Runs queries against relays, one task per relay.
#[derive(Debug, Clone)]
pub struct QueryEngine {
  ctx: RelayContext,
  defaults: DefaultRelays,
  fetch_timeout: Duration,
}

impl QueryEngine {
  pub fn new(config: &Config, ctx: RelayContext) -> Self {
    Self {
      ctx,
      defaults: config.default_relays.clone(),
      fetch_timeout: config.timeouts.fetch,
    }
  }

  /// Asks every relay for `id` concurrently and reports all that had it.
  ///
  /// The returned event is the one from the lowest-indexed matching relay,
  /// regardless of which answered first. When no relay has it, the kind 1
  /// default relay is asked once (unless it was already queried). Not
  /// finding the event is a normal result; see [`FetchResult::is_found`].
  pub async fn fetch_by_id(
    &self,
    id: &str,
    relays: &[RelayEndpoint],
    fetch_timeout: Option<Duration>,
  ) -> Result<FetchResult, Error> {
    let id = id.trim().to_ascii_lowercase();
    if !EventId::is_valid_hex(&id) {
      return Err(ValidationError::InvalidEventId(id).into());
    }
    let fetch_timeout = fetch_timeout.unwrap_or(self.fetch_timeout);

    let mut result = FetchResult {
      id: id.clone(),
      ..Default::default()
    };
    self.fetch_round(&mut result, relays, fetch_timeout).await;

    if !result.is_found() {
      let fallback = RelayEndpoint::parse(self.defaults.single(EventKind::Text))?;
      if !relays.contains(&fallback) {
        info!("[QueryEngine] {id} not found, asking {fallback}");
        result.used_fallback = true;
        self
          .fetch_round(&mut result, std::slice::from_ref(&fallback), fetch_timeout)
          .await;
      }
    }

    if result.is_found() {
      info!(
        "[QueryEngine] {id} found on {} of {} relay(s)",
        result.found_on.len(),
        result.queried.len()
      );
    } else {
      info!("[QueryEngine] {id} not found on any of {} relay(s)", result.queried.len());
    }
    Ok(result)
  }

  async fn fetch_round(
    &self,
    result: &mut FetchResult,
    relays: &[RelayEndpoint],
    fetch_timeout: Duration,
  ) {
    let deadline = Instant::now() + fetch_timeout;
    let tasks: Vec<_> = relays
      .iter()
      .map(|endpoint| {
        let task = lookup_relay(endpoint.clone(), result.id.clone(), self.ctx.clone(), deadline);
        let url = endpoint.to_string();
        tokio::spawn(async move {
          timeout_at(deadline, task).await.unwrap_or_else(|_| {
            Err(
              ConnectionError::Timeout {
                url,
                stage: "fetching".to_string(),
              }
              .into(),
            )
          })
        })
      })
      .collect();

    for (endpoint, task) in relays.iter().zip(tasks) {
      let url = endpoint.to_string();
      result.queried.push(url.clone());
      match task.await {
        Ok(Ok(Lookup::Found { raw, event })) => {
          debug!("[QueryEngine] {url} has {}", result.id);
          if result.raw_response.is_none() {
            result.raw_response = Some(raw);
            result.event = event;
          }
          result.found_on.push(url);
        }
        Ok(Ok(Lookup::Missing)) => debug!("[QueryEngine] {url} does not have {}", result.id),
        Ok(Err(err)) => {
          warn!("[QueryEngine] fetching {} from {url} failed: {err}", result.id);
          result.failed.push(url);
        }
        Err(err) => {
          warn!("[QueryEngine] fetch task for {url} aborted: {err}");
          result.failed.push(url);
        }
      }
    }
  }

  /// Merged stored events matching `filter` across `relays`.
  ///
  /// Relays that fail are logged and skipped. Events are de-duplicated by
  /// id (first relay in input order wins), events that do not verify are
  /// dropped, and the result is ordered newest first, ties by id.
  pub async fn query_relays(
    &self,
    relays: &[RelayEndpoint],
    filter: &Filter,
  ) -> Result<Vec<Event>, Error> {
    if filter.is_empty() {
      return Err(ValidationError::EmptyFilter.into());
    }

    let deadline = Instant::now() + self.fetch_timeout;
    let tasks: Vec<_> = relays
      .iter()
      .map(|endpoint| {
        let task = collect_relay(endpoint.clone(), filter.clone(), self.ctx.clone(), deadline);
        let url = endpoint.to_string();
        tokio::spawn(async move {
          timeout_at(deadline, task).await.unwrap_or_else(|_| {
            let err = ConnectionError::Timeout {
              url,
              stage: "querying".to_string(),
            };
            (Vec::new(), Some(err.into()))
          })
        })
      })
      .collect();

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (endpoint, task) in relays.iter().zip(tasks) {
      let (events, error) = match task.await {
        Ok(collected) => collected,
        Err(err) => {
          warn!("[QueryEngine] query task for {endpoint} aborted: {err}");
          continue;
        }
      };
      if let Some(err) = error {
        warn!(
          "[QueryEngine] query against {endpoint} failed after {} event(s): {err}",
          events.len()
        );
      }
      for event in events {
        if let Err(err) = event.validate() {
          warn!("[QueryEngine] dropping event {} from {endpoint}: {err}", event.id);
          continue;
        }
        if seen.insert(event.id.clone()) {
          merged.push(event);
        }
      }
    }

    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(merged)
  }

  /// Opens `filters` on `relay` in a task that owns the connection.
  ///
  /// Connecting happens before this returns, so an unreachable relay is an
  /// error here rather than an empty subscription.
  pub async fn subscribe(
    &self,
    relay: &RelayEndpoint,
    filters: Vec<Filter>,
    persistent: bool,
  ) -> Result<Subscription, Error> {
    if filters.is_empty() || filters.iter().all(Filter::is_empty) {
      return Err(ValidationError::EmptyFilter.into());
    }

    let mut connection = RelayConnection::connect(relay, self.ctx.clone()).await?;
    let request = ClientToRelayCommRequest::new(new_subscription_id(), filters.clone());
    connection.preflight_auth().await?;
    connection.send_json(request.as_json()).await?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = oneshot::channel();
    let open = Arc::new(AtomicBool::new(true));

    let subscription = Subscription::new(
      request.subscription_id.clone(),
      relay.to_string(),
      filters,
      persistent,
      events_rx,
      close_tx,
      open.clone(),
    );

    let eose_deadline = Instant::now() + self.fetch_timeout;
    tokio::spawn(async move {
      run_subscription(connection, request, persistent, eose_deadline, &events_tx, close_rx).await;
      open.store(false, Ordering::SeqCst);
      drop(events_tx);
    });

    Ok(subscription)
  }
}

async fn run_subscription(
  mut connection: RelayConnection,
  request: ClientToRelayCommRequest,
  persistent: bool,
  eose_deadline: Instant,
  events: &mpsc::UnboundedSender<Event>,
  mut close_rx: oneshot::Receiver<()>,
) {
  let url = connection.endpoint().to_string();
  let subscription_id = request.subscription_id.clone();
  let mut stored_done = false;
  let mut resent = false;

  loop {
    let deadline = if stored_done || persistent {
      None
    } else {
      Some(eose_deadline)
    };

    let frame = tokio::select! {
      frame = connection.recv(deadline, "waiting for EOSE") => frame,
      _ = &mut close_rx => {
        debug!("[Subscription] closing {subscription_id} on {url}");
        break;
      }
    };

    match frame {
      Ok(RelayMessage::Event(message)) if message.subscription_id == subscription_id => {
        if events.send(message.event).is_err() {
          break;
        }
      }
      Ok(RelayMessage::Eose(eose)) if eose.subscription_id == subscription_id => {
        stored_done = true;
        if !persistent {
          debug!("[Subscription] {subscription_id} on {url} reached EOSE");
          break;
        }
      }
      Ok(RelayMessage::Closed(closed)) if closed.subscription_id == subscription_id => {
        if !resent && connection.should_authenticate(closed.prefix()) {
          resent = true;
          let resend = match connection.authenticate().await {
            Ok(()) => connection
              .send_json(request.as_json())
              .await
              .map_err(Error::from),
            Err(err) => Err(err),
          };
          if let Err(err) = resend {
            warn!("[Subscription] {subscription_id} on {url}: {err}");
            connection.close().await;
            return;
          }
          continue;
        }
        warn!("[Subscription] {url} closed {subscription_id}: {}", closed.message);
        connection.close().await;
        return;
      }
      Ok(other) => debug!("[Subscription] ignoring {} from {url}", other.as_json()),
      Err(err) => {
        warn!("[Subscription] {subscription_id} on {url} ended: {err}");
        return;
      }
    }
  }

  let close = ClientToRelayCommClose::new(subscription_id.clone()).as_json();
  if let Err(err) = connection.send_json(close).await {
    debug!("[Subscription] CLOSE {subscription_id} to {url} failed: {err}");
  }
  connection.close().await;
}
