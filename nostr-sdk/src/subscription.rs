use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::event::Event;
use crate::filter::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
  Open,
  Closed,
}

/// Handle to a `REQ` running on its own connection task.
///
/// A non-persistent subscription ends by itself on `EOSE`; a persistent one
/// keeps delivering matching events until [`Subscription::close`] is called
/// or the handle is dropped.
#[derive(Debug)]
pub struct Subscription {
  id: String,
  relay: String,
  filters: Vec<Filter>,
  persistent: bool,
  events: mpsc::UnboundedReceiver<Event>,
  close_tx: Option<oneshot::Sender<()>>,
  open: Arc<AtomicBool>,
}

impl Subscription {
  pub(crate) fn new(
    id: String,
    relay: String,
    filters: Vec<Filter>,
    persistent: bool,
    events: mpsc::UnboundedReceiver<Event>,
    close_tx: oneshot::Sender<()>,
    open: Arc<AtomicBool>,
  ) -> Self {
    Self {
      id,
      relay,
      filters,
      persistent,
      events,
      close_tx: Some(close_tx),
      open,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn relay(&self) -> &str {
    &self.relay
  }

  pub fn filters(&self) -> &[Filter] {
    &self.filters
  }

  pub fn is_persistent(&self) -> bool {
    self.persistent
  }

  /// Next event, or `None` once the subscription has ended and every
  /// buffered event was read.
  pub async fn next(&mut self) -> Option<Event> {
    self.events.recv().await
  }

  /// Events already buffered, without waiting.
  pub fn drain(&mut self) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      events.push(event);
    }
    events
  }

  /// Sends `CLOSE` and ends the connection task. Idempotent.
  pub fn close(&mut self) {
    if let Some(close_tx) = self.close_tx.take() {
      let _ = close_tx.send(());
    }
  }

  pub fn state(&self) -> SubscriptionState {
    if self.open.load(Ordering::SeqCst) {
      SubscriptionState::Open
    } else {
      SubscriptionState::Closed
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.close();
  }
}
