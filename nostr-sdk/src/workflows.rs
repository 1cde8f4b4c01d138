//! Publish, fetch, republish and delete, composed from the engines.

use std::fmt;
use std::sync::Arc;

use log::{error, info, warn};
use serde_json::Value;
use tokio::time::sleep;

use crate::broadcast::{BroadcastEngine, BroadcastOutcome};
use crate::config::{Config, RepublishFallback};
use crate::error::{Error, ValidationError};
use crate::event::{kind::EventKind, tag::Tag, Event};
use crate::keys::{EventTemplate, Signer};
use crate::query::{FetchResult, QueryEngine};
use crate::relay::{RelayContext, RelayEndpoint, RelayInfoCache, RelaySelector};

/// What document publishers get back for a template they handed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
  pub success: bool,
  pub event_id: String,
  pub successful_relays: Vec<String>,
  pub failed_relays: Vec<String>,
  pub message: String,
}

impl From<BroadcastOutcome> for PublishResult {
  fn from(outcome: BroadcastOutcome) -> Self {
    Self {
      success: outcome.success,
      event_id: outcome.event_id,
      successful_relays: outcome.successful_relays,
      failed_relays: outcome.failed_relays,
      message: outcome.message,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
  pub id: String,
  pub found: bool,
  pub found_on: Vec<String>,
  pub event: Option<Event>,
  pub raw_response: Option<String>,
  pub message: String,
}

impl From<FetchResult> for FetchReport {
  fn from(result: FetchResult) -> Self {
    let message = if result.is_found() {
      format!(
        "event {} found on {} relay(s): {}",
        result.id,
        result.found_on.len(),
        result.found_on.join(", ")
      )
    } else {
      format!(
        "event {} not found on any of {} relay(s)",
        result.id,
        result.queried.len()
      )
    };
    Self {
      found: result.is_found(),
      id: result.id,
      found_on: result.found_on,
      event: result.event,
      raw_response: result.raw_response,
      message,
    }
  }
}

/// Step of the delete workflow where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStage {
  FetchOriginal,
  BuildDeletion,
  BroadcastDeletion,
  VerifyAbsence,
}

impl fmt::Display for DeleteStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::FetchOriginal => write!(f, "fetching the original event"),
      Self::BuildDeletion => write!(f, "building the deletion event"),
      Self::BroadcastDeletion => write!(f, "broadcasting the deletion"),
      Self::VerifyAbsence => write!(f, "verifying the deletion"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteStatus {
  /// The event was not found anywhere, nothing was sent.
  Aborted,
  /// The re-fetch after the settle delay found the event nowhere. This is
  /// a single observation, not proof that every relay dropped it.
  Verified,
  /// Relays that still served the event on the re-fetch.
  PartialFailure { remaining: Vec<String> },
  Failed { stage: DeleteStage, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
  pub id: String,
  pub deletion_event_id: Option<String>,
  pub original_kind: Option<EventKind>,
  /// Relays that had the event before the deletion.
  pub found_on: Vec<String>,
  pub default_set_outcome: Option<BroadcastOutcome>,
  pub original_relays_outcome: Option<BroadcastOutcome>,
  pub status: DeleteStatus,
  pub message: String,
}

impl DeleteReport {
  fn new(id: &str) -> Self {
    Self {
      id: id.to_string(),
      deletion_event_id: None,
      original_kind: None,
      found_on: Vec::new(),
      default_set_outcome: None,
      original_relays_outcome: None,
      status: DeleteStatus::Aborted,
      message: String::new(),
    }
  }

  fn failed(mut self, stage: DeleteStage, err: Error) -> Self {
    error!("[LifecycleWorkflows] deleting {} failed while {stage}: {err}", self.id);
    self.message = format!("deletion of {} failed while {stage}: {err}", self.id);
    self.status = DeleteStatus::Failed {
      stage,
      error: err.to_string(),
    };
    self
  }

  pub fn is_verified(&self) -> bool {
    self.status == DeleteStatus::Verified
  }
}

/// The event object inside `["EVENT", <sub>, {...}]`.
fn envelope_event(raw: &str) -> Option<Value> {
  let value: Value = serde_json::from_str(raw).ok()?;
  let mut parts = match value {
    Value::Array(parts) => parts,
    _ => return None,
  };
  if parts.len() < 3 || parts[0] != "EVENT" {
    return None;
  }
  let event = parts.swap_remove(2);
  event.is_object().then_some(event)
}

fn original_kind(fetched: &FetchResult) -> EventKind {
  if let Some(event) = &fetched.event {
    return event.kind;
  }
  fetched
    .raw_response
    .as_deref()
    .and_then(envelope_event)
    .and_then(|event| event.get("kind").and_then(Value::as_u64))
    .map(EventKind::from)
    .unwrap_or(EventKind::Text)
}

/// Best-effort rebuild of an event from whatever fields the envelope has.
fn reconstruct(id: &str, raw: Option<&str>) -> Event {
  let fields = raw.and_then(envelope_event).unwrap_or(Value::Null);
  let text = |name: &str| {
    fields
      .get(name)
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string()
  };
  let tags = fields
    .get("tags")
    .and_then(Value::as_array)
    .map(|tags| {
      tags
        .iter()
        .filter_map(Value::as_array)
        .map(|tag| Tag::new(tag.iter().filter_map(Value::as_str).collect::<Vec<&str>>()))
        .collect()
    })
    .unwrap_or_default();

  Event {
    id: id.to_string(),
    pubkey: text("pubkey"),
    created_at: fields.get("created_at").and_then(Value::as_u64).unwrap_or_default(),
    kind: fields
      .get("kind")
      .and_then(Value::as_u64)
      .map(EventKind::from)
      .unwrap_or(EventKind::Text),
    tags,
    content: text("content"),
    sig: text("sig"),
  }
}

/// Entry points for everything the command front-end does.
pub struct LifecycleWorkflows {
  config: Config,
  signer: Arc<dyn Signer>,
  selector: RelaySelector,
  info: RelayInfoCache,
  broadcast: BroadcastEngine,
  query: QueryEngine,
}

impl LifecycleWorkflows {
  pub fn new(config: Config, signer: Arc<dyn Signer>) -> Self {
    let info = RelayInfoCache::new();
    let ctx = RelayContext::new(config.timeouts, info.clone(), Some(signer.clone()));
    Self {
      selector: RelaySelector::from_config(&config),
      broadcast: BroadcastEngine::new(&config, ctx.clone()),
      query: QueryEngine::new(&config, ctx),
      info,
      signer,
      config,
    }
  }

  pub fn selector(&self) -> &RelaySelector {
    &self.selector
  }

  pub fn relay_info(&self) -> &RelayInfoCache {
    &self.info
  }

  pub fn broadcast_engine(&self) -> &BroadcastEngine {
    &self.broadcast
  }

  pub fn query_engine(&self) -> &QueryEngine {
    &self.query
  }

  /// Where to look for an existing event.
  fn search_set(&self, preferred: &[String]) -> Result<Vec<RelayEndpoint>, Error> {
    if preferred.is_empty() {
      Ok(self.selector.search_relays()?)
    } else {
      Ok(RelayEndpoint::parse_all(preferred)?)
    }
  }

  /// Signs `template` and broadcasts it to the selected relays.
  pub async fn publish(
    &self,
    template: EventTemplate,
    preferred: &[String],
  ) -> Result<PublishResult, Error> {
    let event = self.signer.sign(template)?;
    let relays = self.selector.select_relays(event.kind, preferred)?;
    info!(
      "[LifecycleWorkflows] publishing kind {} event {} to {} relay(s)",
      event.kind,
      event.id,
      relays.len()
    );
    let outcome = self.broadcast.send_with_retry(&event, &relays).await?;
    Ok(outcome.into())
  }

  pub async fn fetch_and_report(&self, id: &str, preferred: &[String]) -> Result<FetchReport, Error> {
    let relays = self.search_set(preferred)?;
    let report = FetchReport::from(self.query.fetch_by_id(id, &relays, None).await?);
    info!("[LifecycleWorkflows] {}", report.message);
    Ok(report)
  }

  /// Re-sends an event found on the network to the default relay set of
  /// its kind.
  pub async fn broadcast_existing(
    &self,
    id: &str,
    preferred: &[String],
  ) -> Result<BroadcastOutcome, Error> {
    let relays = self.search_set(preferred)?;
    let fetched = self.query.fetch_by_id(id, &relays, None).await?;
    if !fetched.is_found() {
      return Err(Error::NotFound(fetched.id));
    }

    let extracted = match &fetched.event {
      Some(event) => event.validate().map(|()| event.clone()),
      None => Err(ValidationError::Envelope(format!(
        "no readable event in the response for {}",
        fetched.id
      ))),
    };

    match extracted {
      Ok(event) => {
        let targets = self.selector.default_relay_set(event.kind)?;
        self.broadcast.send_with_retry(&event, &targets).await
      }
      Err(err) => match self.config.republish_fallback {
        RepublishFallback::Strict => Err(err.into()),
        RepublishFallback::Minimal => {
          let event = reconstruct(&fetched.id, fetched.raw_response.as_deref());
          warn!(
            "[LifecycleWorkflows] {err}; re-broadcasting a reconstruction of {}, original fields may be lost",
            fetched.id
          );
          let targets = self.selector.default_relay_set(event.kind)?;
          self.broadcast.send_prepared(&event, &targets).await
        }
      },
    }
  }

  /// Deletes an event and checks, once, that relays stopped serving it.
  ///
  /// Never fails: every error ends up in [`DeleteReport::status`].
  pub async fn delete_and_verify(&self, id: &str, preferred: &[String]) -> DeleteReport {
    let mut report = DeleteReport::new(id);

    let relays = match self.search_set(preferred) {
      Ok(relays) => relays,
      Err(err) => return report.failed(DeleteStage::FetchOriginal, err),
    };
    let fetched = match self.query.fetch_by_id(id, &relays, None).await {
      Ok(fetched) => fetched,
      Err(err) => return report.failed(DeleteStage::FetchOriginal, err),
    };
    report.id = fetched.id.clone();
    if !fetched.is_found() {
      report.message = format!(
        "deletion aborted, event {} not found on any relay",
        report.id
      );
      warn!("[LifecycleWorkflows] {}", report.message);
      return report;
    }
    report.found_on = fetched.found_on.clone();

    let kind = original_kind(&fetched);
    report.original_kind = Some(kind);

    if let Some(original) = &fetched.event {
      if original.pubkey != self.signer.public_key() {
        warn!(
          "[LifecycleWorkflows] {} was signed by {}, relays may refuse a deletion from {}",
          report.id,
          original.pubkey,
          self.signer.public_key()
        );
      }
    }

    let template = EventTemplate::new(
      EventKind::Deletion,
      "",
      vec![
        Tag::event(&report.id, report.found_on.first().map(String::as_str)),
        Tag::kind(kind.as_u64()),
      ],
    );
    let deletion = match self.signer.sign(template) {
      Ok(deletion) => deletion,
      Err(err) => return report.failed(DeleteStage::BuildDeletion, err.into()),
    };
    report.deletion_event_id = Some(deletion.id.clone());

    let default_set = match self.selector.default_relay_set(kind) {
      Ok(relays) => relays,
      Err(err) => return report.failed(DeleteStage::BroadcastDeletion, err.into()),
    };
    let original_relays = match RelayEndpoint::parse_all(&report.found_on) {
      Ok(relays) => relays,
      Err(err) => return report.failed(DeleteStage::BroadcastDeletion, err.into()),
    };

    let (to_defaults, to_originals) = tokio::join!(
      self.broadcast.send_with_retry(&deletion, &default_set),
      self.broadcast.send_with_retry(&deletion, &original_relays),
    );
    let mut broadcast_errors = Vec::new();
    match to_defaults {
      Ok(outcome) => report.default_set_outcome = Some(outcome),
      Err(err) => {
        warn!("[LifecycleWorkflows] deletion to the default set failed: {err}");
        broadcast_errors.push(err);
      }
    }
    match to_originals {
      Ok(outcome) => report.original_relays_outcome = Some(outcome),
      Err(err) => {
        warn!("[LifecycleWorkflows] deletion to the original relays failed: {err}");
        broadcast_errors.push(err);
      }
    }
    if broadcast_errors.len() == 2 {
      if let Some(err) = broadcast_errors.pop() {
        return report.failed(DeleteStage::BroadcastDeletion, err);
      }
    }

    info!(
      "[LifecycleWorkflows] waiting {:?} before checking {}",
      self.config.settle_delay, report.id
    );
    sleep(self.config.settle_delay).await;

    let refetched = match self.query.fetch_by_id(&report.id, &relays, None).await {
      Ok(refetched) => refetched,
      Err(err) => return report.failed(DeleteStage::VerifyAbsence, err),
    };

    if refetched.is_found() {
      report.message = format!(
        "deletion {} sent, but {} is still served by: {}",
        deletion.id,
        report.id,
        refetched.found_on.join(", ")
      );
      warn!("[LifecycleWorkflows] {}", report.message);
      report.status = DeleteStatus::PartialFailure {
        remaining: refetched.found_on,
      };
    } else {
      report.message = format!(
        "deletion {} sent, {} no longer found on any relay",
        deletion.id, report.id
      );
      info!("[LifecycleWorkflows] {}", report.message);
      report.status = DeleteStatus::Verified;
    }
    report
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::tag::TagKind;
  use crate::keys::Keys;
  use crate::test_utils::{test_config, AcceptPolicy, MockRelay, MockRelayOptions, TempRelayFile};

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  fn make_sut(config: Config) -> (LifecycleWorkflows, Arc<Keys>) {
    let keys = Arc::new(Keys::generate());
    (LifecycleWorkflows::new(config, keys.clone()), keys)
  }

  fn note(keys: &Keys, content: &str) -> Event {
    keys
      .sign(EventTemplate::new(EventKind::Text, content, vec![]))
      .unwrap()
  }

  async fn relay(options: MockRelayOptions) -> MockRelay {
    MockRelay::start(options).await
  }

  #[tokio::test]
  async fn publishes_template_to_preferred_relays() {
    let a = relay(MockRelayOptions::default()).await;
    let (workflows, keys) = make_sut(test_config());

    let result = workflows
      .publish(
        EventTemplate::new(EventKind::LongFormArticle, "# Title", vec![Tag::identifier("title")]),
        &[a.url().to_string()],
      )
      .await
      .unwrap();

    assert!(result.success);
    assert_eq!(result.successful_relays, vec![a.url().to_string()]);
    let received = a.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, result.event_id);
    assert_eq!(received[0].pubkey, keys.public_key());
    assert_eq!(received[0].identifier(), Some("title"));
  }

  #[tokio::test]
  async fn publishes_to_the_user_relay_list() {
    let a = relay(MockRelayOptions::default()).await;
    let file = TempRelayFile::new(Some(&format!("# mine\n{}\n", a.url())));
    let (workflows, _) = make_sut(test_config().with_relays_file(file.path()));

    let result = workflows
      .publish(EventTemplate::new(EventKind::Text, "hello", vec![]), &[])
      .await
      .unwrap();

    assert!(result.success);
    assert_eq!(a.received_ids(), vec![result.event_id]);
  }

  #[tokio::test]
  async fn fetch_reports_where_the_event_lives() {
    let author = Keys::generate();
    let event = note(&author, "where am I");
    let a = relay(MockRelayOptions {
      stored: vec![event.clone()],
      ..Default::default()
    })
    .await;
    let b = relay(MockRelayOptions::default()).await;
    let (workflows, _) = make_sut(test_config());
    let preferred = [a.url().to_string(), b.url().to_string()];

    let found = workflows.fetch_and_report(&event.id, &preferred).await.unwrap();
    let missing = workflows
      .fetch_and_report(&"f".repeat(64), &preferred)
      .await
      .unwrap();

    assert!(found.found);
    assert_eq!(found.found_on, vec![a.url().to_string()]);
    assert_eq!(found.event, Some(event));
    assert!(!missing.found);
    assert!(missing.message.contains("not found"));
  }

  #[tokio::test]
  async fn republishes_to_the_default_set() {
    let event = note(&Keys::generate(), "spread me");
    let source = relay(MockRelayOptions {
      stored: vec![event.clone()],
      ..Default::default()
    })
    .await;
    let target = relay(MockRelayOptions::default()).await;
    let mut config = test_config();
    config.default_relays.text_set = vec![target.url().to_string()];
    let (workflows, _) = make_sut(config);

    let outcome = workflows
      .broadcast_existing(&event.id, &[source.url().to_string()])
      .await
      .unwrap();

    assert!(outcome.success);
    assert_eq!(target.received_ids(), vec![event.id]);
  }

  #[tokio::test]
  async fn republishing_an_unknown_event_is_not_found() {
    let empty = relay(MockRelayOptions::default()).await;
    let (workflows, _) = make_sut(test_config());

    let result = workflows
      .broadcast_existing(&"a".repeat(64), &[empty.url().to_string()])
      .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
  }

  #[tokio::test]
  async fn republish_fallback_controls_unverifiable_events() {
    let mut tampered = note(&Keys::generate(), "original");
    tampered.content = "tampered".to_string();
    let source = relay(MockRelayOptions {
      stored: vec![tampered.clone()],
      ..Default::default()
    })
    .await;
    let target = relay(MockRelayOptions::default()).await;
    let mut config = test_config();
    config.default_relays.text_set = vec![target.url().to_string()];
    let preferred = [source.url().to_string()];

    let (strict, _) = make_sut(config.clone());
    let result = strict.broadcast_existing(&tampered.id, &preferred).await;
    assert!(matches!(result, Err(Error::Validation(ValidationError::InvalidId))));
    assert_eq!(target.event_attempts(), 0);

    config.republish_fallback = RepublishFallback::Minimal;
    let (minimal, _) = make_sut(config);
    let outcome = minimal.broadcast_existing(&tampered.id, &preferred).await.unwrap();
    assert!(!outcome.success);
    assert!(target.event_attempts() >= 1);
  }

  #[test]
  fn reconstructs_what_the_envelope_holds() {
    let raw = r#"["EVENT","sub",{"id":"x","kind":30023,"content":"body","tags":[["d","slug"],[1]],"created_at":"bad"}]"#;

    let event = reconstruct("x", Some(raw));

    assert_eq!(event.kind, EventKind::LongFormArticle);
    assert_eq!(event.content, "body");
    assert_eq!(event.identifier(), Some("slug"));
    assert_eq!(event.tags.len(), 2);
    assert_eq!(event.created_at, 0);
    assert_eq!(reconstruct("y", None).kind, EventKind::Text);
  }

  #[tokio::test]
  async fn deleting_a_missing_event_sends_nothing() {
    let empty = relay(MockRelayOptions::default()).await;
    let (workflows, _) = make_sut(test_config());

    let report = workflows
      .delete_and_verify(&"9".repeat(64), &[empty.url().to_string()])
      .await;

    assert_eq!(report.status, DeleteStatus::Aborted);
    assert_eq!(report.deletion_event_id, None);
    assert!(report.message.contains("deletion aborted"));
    assert_eq!(empty.event_attempts(), 0);
  }

  #[tokio::test]
  async fn deletion_is_verified_when_no_relay_serves_the_event() {
    let config = test_config();
    let (workflows, keys) = make_sut(config);
    let event = note(&keys, "delete me");
    let a = relay(MockRelayOptions {
      stored: vec![event.clone()],
      honor_deletions: true,
      ..Default::default()
    })
    .await;

    let report = workflows.delete_and_verify(&event.id, &[a.url().to_string()]).await;

    assert!(report.is_verified(), "{report:?}");
    assert_eq!(report.found_on, vec![a.url().to_string()]);
    assert_eq!(report.original_kind, Some(EventKind::Text));
    assert!(report.original_relays_outcome.unwrap().success);
    // the relay keeps the kind 5 event itself, only the target is gone
    assert!(!a.stored_ids().contains(&event.id));
    assert_eq!(a.stored_ids(), vec![report.deletion_event_id.clone().unwrap()]);

    let deletion = a.received().pop().unwrap();
    assert_eq!(Some(deletion.id.clone()), report.deletion_event_id);
    assert_eq!(deletion.kind, EventKind::Deletion);
    assert_eq!(deletion.first_tag_value(TagKind::Event), Some(event.id.as_str()));
    assert_eq!(deletion.first_tag_value(TagKind::Kind), Some("1"));
    let e_tag = deletion.tags_of(TagKind::Event).next().unwrap();
    assert_eq!(e_tag.get(2), Some(a.url()));
  }

  #[tokio::test]
  async fn deletion_lists_relays_that_still_serve_the_event() {
    let (workflows, keys) = make_sut(test_config());
    let event = note(&keys, "stubborn");
    let honoring = relay(MockRelayOptions {
      stored: vec![event.clone()],
      honor_deletions: true,
      ..Default::default()
    })
    .await;
    let stubborn = relay(MockRelayOptions {
      stored: vec![event.clone()],
      policy: AcceptPolicy::Never,
      ..Default::default()
    })
    .await;
    let preferred = [honoring.url().to_string(), stubborn.url().to_string()];

    let report = workflows.delete_and_verify(&event.id, &preferred).await;

    assert_eq!(
      report.status,
      DeleteStatus::PartialFailure {
        remaining: vec![stubborn.url().to_string()]
      }
    );
    assert!(report.message.contains(stubborn.url()));
  }

  #[tokio::test]
  async fn bad_relay_url_becomes_a_failed_report() {
    let (workflows, _) = make_sut(test_config());

    let report = workflows
      .delete_and_verify(&"9".repeat(64), &["https://not-a-relay.example.com".to_string()])
      .await;

    assert!(matches!(
      report.status,
      DeleteStatus::Failed {
        stage: DeleteStage::FetchOriginal,
        ..
      }
    ));
  }
}
