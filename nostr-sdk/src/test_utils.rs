//! In-process relay and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::auth::challenge::verify_auth_event;
use crate::client_to_relay_communication::{
  auth::ClientToRelayCommAuth, close::ClientToRelayCommClose, event::ClientToRelayCommEvent,
  request::ClientToRelayCommRequest,
};
use crate::config::{Config, DefaultRelays, RetryPolicy, Timeouts};
use crate::event::{kind::EventKind, tag::TagKind, Event};
use crate::filter::Filter;
use crate::relay::RelayEndpoint;
use crate::relay_to_client_communication::{
  auth::RelayToClientCommAuth, closed::RelayToClientCommClosed, eose::RelayToClientCommEose,
  event::RelayToClientCommEvent, ok::RelayToClientCommOk,
};

/// A relay nothing listens on.
pub const DEAD_RELAY: &str = "ws://127.0.0.1:1";

/// Short timeouts, near zero backoff and defaults that never leave the host.
pub fn test_config() -> Config {
  let dead = vec![DEAD_RELAY.to_string()];
  Config {
    relays_file: std::env::temp_dir().join(format!("courier-missing-{}", uuid::Uuid::new_v4())),
    timeouts: Timeouts {
      connect: Duration::from_secs(2),
      response: Duration::from_secs(1),
      challenge: Duration::from_secs(1),
      auth_ok: Duration::from_secs(1),
      fetch: Duration::from_secs(2),
    },
    retry: RetryPolicy {
      max_attempts: 3,
      backoff: Duration::from_millis(10),
    },
    default_relays: DefaultRelays {
      text: DEAD_RELAY.to_string(),
      document: DEAD_RELAY.to_string(),
      text_set: dead.clone(),
      document_set: dead,
    },
    settle_delay: Duration::from_millis(10),
    ..Default::default()
  }
}

/// Relay list file removed on drop. `None` leaves the file absent.
pub struct TempRelayFile {
  path: PathBuf,
}

impl TempRelayFile {
  pub fn new(contents: Option<&str>) -> Self {
    let path = std::env::temp_dir().join(format!("courier-relays-{}", uuid::Uuid::new_v4()));
    let file = Self { path };
    if let Some(contents) = contents {
      file.write(contents);
    }
    file
  }

  pub fn path(&self) -> PathBuf {
    self.path.clone()
  }

  pub fn write(&self, contents: &str) {
    fs::write(&self.path, contents).unwrap();
  }

  pub fn read(&self) -> String {
    fs::read_to_string(&self.path).unwrap()
  }
}

impl Drop for TempRelayFile {
  fn drop(&mut self) {
    let _ = fs::remove_file(&self.path);
  }
}

/// How the mock relay answers `EVENT` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptPolicy {
  #[default]
  Always,
  /// `OK false "blocked: ..."` every time.
  Never,
  /// `OK false "error: ..."` for the first n events, then accepts.
  RejectFirst(usize),
  /// Never answers `EVENT` or `REQ`.
  Silent,
}

#[derive(Debug, Clone, Default)]
pub struct MockRelayOptions {
  pub policy: AcceptPolicy,
  /// Sends a challenge on connect and refuses `EVENT`/`REQ` until answered.
  pub require_auth: bool,
  /// Records `AUTH` frames without ever answering them.
  pub ignore_auth: bool,
  /// Accepted kind 5 events remove the events they reference.
  pub honor_deletions: bool,
  /// Events served to `REQ` from the start.
  pub stored: Vec<Event>,
}

#[derive(Debug, Default)]
struct MockState {
  received: Vec<Event>,
  auth_events: Vec<Event>,
  stored: Vec<Event>,
  event_attempts: usize,
}

struct Shared {
  url: String,
  options: MockRelayOptions,
  state: Mutex<MockState>,
  live: broadcast::Sender<Event>,
}

impl Shared {
  fn lock(&self) -> MutexGuard<'_, MockState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// A NIP-01 relay on `127.0.0.1` with an ephemeral port, alive until dropped.
pub struct MockRelay {
  shared: Arc<Shared>,
  listener: JoinHandle<()>,
}

impl MockRelay {
  pub async fn start(options: MockRelayOptions) -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (live, _) = broadcast::channel(64);

    let shared = Arc::new(Shared {
      url: format!("ws://127.0.0.1:{port}"),
      state: Mutex::new(MockState {
        stored: options.stored.clone(),
        ..Default::default()
      }),
      options,
      live,
    });

    let accepting = shared.clone();
    let listener = tokio::spawn(async move {
      while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(serve(stream, accepting.clone()));
      }
    });

    Self { shared, listener }
  }

  pub fn url(&self) -> &str {
    &self.shared.url
  }

  pub fn endpoint(&self) -> RelayEndpoint {
    RelayEndpoint::parse(&self.shared.url).unwrap()
  }

  /// Events accepted, in arrival order.
  pub fn received(&self) -> Vec<Event> {
    self.shared.lock().received.clone()
  }

  pub fn received_ids(&self) -> Vec<String> {
    self.received().into_iter().map(|event| event.id).collect()
  }

  pub fn auth_events(&self) -> Vec<Event> {
    self.shared.lock().auth_events.clone()
  }

  pub fn stored_ids(&self) -> Vec<String> {
    self.shared.lock().stored.iter().map(|event| event.id.clone()).collect()
  }

  /// Every `EVENT` frame seen, accepted or not.
  pub fn event_attempts(&self) -> usize {
    self.shared.lock().event_attempts
  }

  /// Stores `event` and pushes it to matching open subscriptions.
  pub fn push(&self, event: Event) {
    self.shared.lock().stored.push(event.clone());
    let _ = self.shared.live.send(event);
  }
}

impl Drop for MockRelay {
  fn drop(&mut self) {
    self.listener.abort();
  }
}

struct Session {
  challenge: String,
  authenticated: bool,
  subscriptions: HashMap<String, Vec<Filter>>,
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
  let ws = match accept_async(stream).await {
    Ok(ws) => ws,
    Err(_) => return,
  };
  let (mut outgoing, mut incoming) = ws.split();
  let mut live = shared.live.subscribe();

  let mut session = Session {
    challenge: uuid::Uuid::new_v4().to_string(),
    authenticated: false,
    subscriptions: HashMap::new(),
  };

  if shared.options.require_auth {
    let challenge = RelayToClientCommAuth::new_challenge(session.challenge.clone()).as_json();
    if outgoing.send(Message::Text(challenge)).await.is_err() {
      return;
    }
  }

  loop {
    tokio::select! {
      frame = incoming.next() => {
        let text = match frame {
          Some(Ok(Message::Text(text))) => text,
          Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
          Some(Ok(_)) => continue,
        };
        for reply in handle(&text, &shared, &mut session) {
          if outgoing.send(Message::Text(reply)).await.is_err() {
            return;
          }
        }
      }
      Ok(event) = live.recv() => {
        for (subscription_id, filters) in session.subscriptions.iter() {
          if filters.iter().any(|filter| filter.matches(&event)) {
            let frame = RelayToClientCommEvent::new_event(subscription_id.clone(), event.clone()).as_json();
            if outgoing.send(Message::Text(frame)).await.is_err() {
              return;
            }
          }
        }
      }
    }
  }
}

fn ok(event_id: &str, accepted: bool, message: &str) -> String {
  RelayToClientCommOk::new_ok(event_id.to_string(), accepted, message.to_string()).as_json()
}

fn handle(text: &str, shared: &Shared, session: &mut Session) -> Vec<String> {
  let value: Value = match serde_json::from_str(text) {
    Ok(value) => value,
    Err(_) => return vec![],
  };
  let code = value
    .as_array()
    .and_then(|frame| frame.first())
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string();
  let options = &shared.options;

  match code.as_str() {
    "EVENT" => {
      let event = match ClientToRelayCommEvent::from_value(value) {
        Ok(frame) => frame.event,
        Err(_) => return vec![],
      };
      let mut state = shared.lock();
      state.event_attempts += 1;

      if options.policy == AcceptPolicy::Silent {
        return vec![];
      }
      if options.require_auth && !session.authenticated {
        return vec![ok(&event.id, false, "auth-required: authenticate to publish")];
      }
      match options.policy {
        AcceptPolicy::Never => return vec![ok(&event.id, false, "blocked: not accepting events")],
        AcceptPolicy::RejectFirst(n) if state.event_attempts <= n => {
          return vec![ok(&event.id, false, "error: temporarily unavailable")]
        }
        _ => {}
      }
      if let Err(err) = event.validate() {
        return vec![ok(&event.id, false, &format!("invalid: {err}"))];
      }

      state.received.push(event.clone());
      if options.honor_deletions && event.kind == EventKind::Deletion {
        let targets: Vec<String> = event
          .tags_of(TagKind::Event)
          .filter_map(|tag| tag.value().map(str::to_string))
          .collect();
        state
          .stored
          .retain(|stored| !(targets.contains(&stored.id) && stored.pubkey == event.pubkey));
      }
      if state.stored.iter().any(|stored| stored.id == event.id) {
        return vec![ok(&event.id, true, "duplicate: already have this event")];
      }
      state.stored.push(event.clone());
      drop(state);
      let _ = shared.live.send(event.clone());

      vec![ok(&event.id, true, "")]
    }
    "REQ" => {
      let request = match ClientToRelayCommRequest::from_value(value) {
        Ok(request) => request,
        Err(_) => return vec![],
      };
      if options.policy == AcceptPolicy::Silent {
        return vec![];
      }
      if options.require_auth && !session.authenticated {
        return vec![RelayToClientCommClosed::new_closed(
          request.subscription_id,
          "auth-required: authenticate to read".to_string(),
        )
        .as_json()];
      }

      let state = shared.lock();
      let mut replies: Vec<String> = state
        .stored
        .iter()
        .filter(|event| request.filters.iter().any(|filter| filter.matches(event)))
        .map(|event| {
          RelayToClientCommEvent::new_event(request.subscription_id.clone(), event.clone()).as_json()
        })
        .collect();
      replies.push(RelayToClientCommEose::new_eose(request.subscription_id.clone()).as_json());
      session
        .subscriptions
        .insert(request.subscription_id, request.filters);
      replies
    }
    "CLOSE" => {
      if let Ok(close) = ClientToRelayCommClose::from_value(value) {
        session.subscriptions.remove(&close.subscription_id);
      }
      vec![]
    }
    "AUTH" => {
      let event = match ClientToRelayCommAuth::from_value(value) {
        Ok(frame) => frame.event,
        Err(_) => return vec![],
      };
      shared.lock().auth_events.push(event.clone());
      if options.ignore_auth {
        return vec![];
      }
      match verify_auth_event(&event, &shared.url, &session.challenge) {
        Ok(()) => {
          session.authenticated = true;
          vec![ok(&event.id, true, "")]
        }
        Err(err) => vec![ok(&event.id, false, &format!("invalid: {err}"))],
      }
    }
    _ => vec![],
  }
}
