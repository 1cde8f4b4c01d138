use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::{
  connect_async,
  tungstenite::{Error as WsError, Message},
  MaybeTlsStream, WebSocketStream,
};

use super::{RelayContext, RelayEndpoint};
use crate::auth::challenge::{build_auth_event, AuthState, ChallengeSession};
use crate::client_to_relay_communication::{auth::ClientToRelayCommAuth, event::ClientToRelayCommEvent};
use crate::error::{AuthError, ConnectionError, Error};
use crate::event::Event;
use crate::relay_to_client_communication::{
  ok::{MessagePrefix, RelayToClientCommOk},
  RelayMessage,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame as received, with its parsed form when it is one we know.
#[derive(Debug, Clone)]
pub struct RawFrame {
  pub text: String,
  pub message: Option<RelayMessage>,
}

fn classify(url: &str, err: WsError) -> ConnectionError {
  let url = url.to_string();
  match err {
    WsError::ConnectionClosed | WsError::AlreadyClosed => ConnectionError::Closed { url },
    WsError::Io(err) => ConnectionError::Unreachable {
      url,
      reason: err.to_string(),
    },
    WsError::Tls(err) => ConnectionError::Tls {
      url,
      reason: err.to_string(),
    },
    WsError::Http(response) => ConnectionError::Protocol {
      url,
      reason: format!("HTTP {} during websocket upgrade", response.status()),
    },
    other => ConnectionError::Protocol {
      url,
      reason: other.to_string(),
    },
  }
}

/// One websocket to one relay. Owned by the task that opened it.
pub struct RelayConnection {
  endpoint: RelayEndpoint,
  stream: WsStream,
  ctx: RelayContext,
  session: ChallengeSession,
  backlog: VecDeque<RawFrame>,
}

impl RelayConnection {
  pub async fn connect(
    endpoint: &RelayEndpoint,
    ctx: RelayContext,
  ) -> Result<Self, ConnectionError> {
    let url = endpoint.to_string();
    let (host, port) = endpoint
      .socket_addr()
      .ok_or_else(|| ConnectionError::Dns {
        url: url.clone(),
        reason: "no host to resolve".to_string(),
      })?;

    let connecting = async {
      let resolved = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|err| ConnectionError::Dns {
          url: url.clone(),
          reason: err.to_string(),
        })?;
      if resolved.count() == 0 {
        return Err(ConnectionError::Dns {
          url: url.clone(),
          reason: format!("{host} resolved to no addresses"),
        });
      }
      let (stream, _) = connect_async(endpoint.as_str())
        .await
        .map_err(|err| classify(&url, err))?;
      Ok::<WsStream, ConnectionError>(stream)
    };

    let stream = timeout(ctx.timeouts.connect, connecting)
      .await
      .map_err(|_| ConnectionError::Timeout {
        url: url.clone(),
        stage: "connecting".to_string(),
      })??;

    debug!("[RelayConnection] connected to {url}");

    Ok(Self {
      endpoint: endpoint.clone(),
      stream,
      ctx,
      session: ChallengeSession::new(),
      backlog: VecDeque::new(),
    })
  }

  pub fn endpoint(&self) -> &RelayEndpoint {
    &self.endpoint
  }

  pub fn auth_state(&self) -> &AuthState {
    self.session.state()
  }

  pub fn context(&self) -> &RelayContext {
    &self.ctx
  }

  pub async fn send_json(&mut self, text: String) -> Result<(), ConnectionError> {
    debug!("[RelayConnection] {} <- {text}", self.endpoint);
    self
      .stream
      .send(Message::Text(text))
      .await
      .map_err(|err| classify(self.endpoint.as_str(), err))
  }

  async fn read_socket(
    &mut self,
    deadline: Option<Instant>,
    stage: &str,
  ) -> Result<RawFrame, ConnectionError> {
    loop {
      let next = match deadline {
        Some(deadline) => match timeout_at(deadline, self.stream.next()).await {
          Ok(next) => next,
          Err(_) => {
            return Err(ConnectionError::Timeout {
              url: self.endpoint.to_string(),
              stage: stage.to_string(),
            })
          }
        },
        None => self.stream.next().await,
      };

      let message = match next {
        Some(Ok(message)) => message,
        Some(Err(err)) => return Err(classify(self.endpoint.as_str(), err)),
        None => {
          return Err(ConnectionError::Closed {
            url: self.endpoint.to_string(),
          })
        }
      };

      match message {
        Message::Text(text) => {
          debug!("[RelayConnection] {} -> {text}", self.endpoint);
          let message = RelayMessage::from_json(text.as_str()).ok();
          if message.is_none() {
            debug!("[RelayConnection] unrecognised frame from {}", self.endpoint);
          }
          return Ok(RawFrame { text, message });
        }
        Message::Close(_) => {
          return Err(ConnectionError::Closed {
            url: self.endpoint.to_string(),
          })
        }
        _ => continue,
      }
    }
  }

  /// Consumes frames that only update connection state.
  fn intercept(&mut self, frame: RawFrame) -> Option<RawFrame> {
    let url = self.endpoint.as_str();
    match &frame.message {
      Some(RelayMessage::Auth(auth)) => {
        if !self.session.receive_challenge(auth.challenge.clone()) {
          debug!("[RelayConnection] {url} repeated an answered challenge");
        }
        None
      }
      Some(RelayMessage::Notice(notice)) => {
        warn!("[RelayConnection] NOTICE from {url}: {}", notice.message);
        self.ctx.info.record_notice(url, &notice.message);
        None
      }
      _ => Some(frame),
    }
  }

  /// Next frame that is not an `AUTH` challenge or a `NOTICE`.
  pub async fn recv_raw(
    &mut self,
    deadline: Option<Instant>,
    stage: &str,
  ) -> Result<RawFrame, ConnectionError> {
    if let Some(frame) = self.backlog.pop_front() {
      return Ok(frame);
    }
    loop {
      let frame = self.read_socket(deadline, stage).await?;
      if let Some(frame) = self.intercept(frame) {
        return Ok(frame);
      }
    }
  }

  /// Like [`Self::recv_raw`], skipping frames we cannot parse.
  pub async fn recv(
    &mut self,
    deadline: Option<Instant>,
    stage: &str,
  ) -> Result<RelayMessage, ConnectionError> {
    loop {
      if let Some(message) = self.recv_raw(deadline, stage).await?.message {
        return Ok(message);
      }
    }
  }

  fn fail_auth(&mut self, err: AuthError) -> Error {
    let err = self.session.fail(err);
    self
      .ctx
      .info
      .record_auth(self.endpoint.as_str(), self.session.state().clone());
    warn!("[RelayConnection] authentication with {} failed: {err}", self.endpoint);
    err.into()
  }

  /// Runs the NIP-42 handshake: waits for a challenge (unless one is
  /// already pending), answers it once and waits for the relay's `OK`.
  pub async fn authenticate(&mut self) -> Result<(), Error> {
    let signer = match self.ctx.signer.clone() {
      Some(signer) => signer,
      None => {
        return Err(self.fail_auth(AuthError::Signing(
          "no signing key available".to_string(),
        )))
      }
    };

    if !self.session.has_pending() {
      self.session.await_challenge();
      let deadline = Instant::now() + self.ctx.timeouts.challenge;
      while !self.session.has_pending() {
        match self.read_socket(Some(deadline), "waiting for AUTH challenge").await {
          Ok(frame) => {
            if let Some(frame) = self.intercept(frame) {
              self.backlog.push_back(frame);
            }
          }
          Err(ConnectionError::Timeout { .. }) => {
            return Err(self.fail_auth(AuthError::ChallengeMissing))
          }
          Err(err) => {
            self.fail_auth(AuthError::ChallengeMissing);
            return Err(err.into());
          }
        }
      }
    }

    let challenge = match self.session.pending() {
      Some(challenge) => challenge.to_string(),
      None => return Err(self.fail_auth(AuthError::ChallengeMissing)),
    };
    let auth_event = match build_auth_event(signer.as_ref(), self.endpoint.as_str(), &challenge) {
      Ok(event) => event,
      Err(err) => return Err(self.fail_auth(err)),
    };
    self.session.begin(auth_event.id.clone());

    if let Err(err) = self
      .send_json(ClientToRelayCommAuth::new(auth_event).as_json())
      .await
    {
      self.fail_auth(AuthError::Rejected(err.to_string()));
      return Err(err.into());
    }

    let deadline = Instant::now() + self.ctx.timeouts.auth_ok;
    loop {
      match self.read_socket(Some(deadline), "waiting for AUTH OK").await {
        Ok(frame) => match self.intercept(frame) {
          Some(RawFrame {
            message: Some(RelayMessage::Ok(ok)),
            ..
          }) if self.session.awaiting_ok() == Some(ok.event_id.as_str()) => {
            if !ok.accepted {
              return Err(self.fail_auth(AuthError::Rejected(ok.message)));
            }
            self.session.finish(Ok(()))?;
            self
              .ctx
              .info
              .record_auth(self.endpoint.as_str(), AuthState::Authenticated);
            info!("[RelayConnection] authenticated with {}", self.endpoint);
            return Ok(());
          }
          Some(frame) => self.backlog.push_back(frame),
          None => {}
        },
        Err(ConnectionError::Timeout { .. }) => return Err(self.fail_auth(AuthError::Timeout)),
        Err(err) => {
          self.fail_auth(AuthError::Timeout);
          return Err(err.into());
        }
      }
    }
  }

  /// Authenticates up front when the relay is known to demand it.
  pub async fn preflight_auth(&mut self) -> Result<(), Error> {
    if self.ctx.signer.is_some()
      && !self.session.is_authenticated()
      && self.ctx.info.requires_auth(self.endpoint.as_str())
    {
      debug!("[RelayConnection] {} requires auth, authenticating first", self.endpoint);
      self.authenticate().await?;
    }
    Ok(())
  }

  /// Whether an `auth-required:` answer should trigger a handshake.
  pub fn should_authenticate(&self, prefix: Option<MessagePrefix>) -> bool {
    if prefix != Some(MessagePrefix::AuthRequired) {
      return false;
    }
    self.ctx.info.mark_auth_required(self.endpoint.as_str());
    self.ctx.signer.is_some() && !self.session.is_authenticated()
  }

  async fn wait_ok(&mut self, event_id: &str) -> Result<RelayToClientCommOk, ConnectionError> {
    let deadline = Instant::now() + self.ctx.timeouts.response;
    loop {
      match self.recv(Some(deadline), "waiting for OK").await? {
        RelayMessage::Ok(ok) if ok.event_id == event_id => return Ok(ok),
        other => debug!(
          "[RelayConnection] ignoring {} from {} while waiting for OK",
          other.as_json(),
          self.endpoint
        ),
      }
    }
  }

  /// Sends `["EVENT", event]` and waits for the matching `OK`. An
  /// `auth-required` rejection triggers one handshake and one resend.
  pub async fn publish(&mut self, event: &Event) -> Result<RelayToClientCommOk, Error> {
    self.preflight_auth().await?;

    let frame = ClientToRelayCommEvent::new_event(event.clone()).as_json();
    self.send_json(frame.clone()).await?;
    let mut ok = self.wait_ok(&event.id).await?;

    if !ok.accepted && self.should_authenticate(ok.prefix()) {
      self.authenticate().await?;
      self.send_json(frame).await?;
      ok = self.wait_ok(&event.id).await?;
    }

    if !ok.accepted && ok.prefix() == Some(MessagePrefix::RateLimited) {
      self.ctx.info.record_rate_limited(self.endpoint.as_str());
    }

    Ok(ok)
  }

  pub async fn close(mut self) {
    if let Err(err) = self.stream.close(None).await {
      debug!("[RelayConnection] closing {}: {err}", self.endpoint);
    }
  }
}
