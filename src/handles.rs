//! Poll-based handles that views hold onto.
//!
//! Views never await. They keep a [`Subscription`] per key they render and a
//! [`PendingMutation`] per write they fire, and call `poll()` on every tick:
//!
//! ```ignore
//! let mut post = client.subscribe::<Option<Post>>(CacheKey::Post(7));
//!
//! // In event loop tick
//! if post.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match post.state() {
//!     QueryState::Loading { .. } => render_spinner(),
//!     QueryState::Success { data, stale } => render_post(data, *stale),
//!     QueryState::Error { message, .. } => render_error(message),
//!     QueryState::Idle => {}
//! }
//! ```

use std::future::Future;
use tokio::sync::{broadcast, mpsc};

use crate::cache::{CacheEntry, CacheKey, CacheStatus, Cacheable};
use crate::error::Result;
use crate::sync::SyncClient;

/// What a view can render for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Nothing requested yet
  Idle,
  /// A fetch is running; `previous` is the value it will replace
  Loading { previous: Option<T> },
  /// `stale` is set while the value waits for a refresh
  Success { data: T, stale: bool },
  /// The last fetch failed; `previous` is the last value that did load
  Error {
    message: String,
    previous: Option<T>,
  },
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading { .. })
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error { .. })
  }

  /// Best value to show, including one kept through a reload or error.
  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success { data, .. } => Some(data),
      QueryState::Loading { previous } | QueryState::Error { previous, .. } => previous.as_ref(),
      QueryState::Idle => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error { message, .. } => Some(message),
      _ => None,
    }
  }
}

/// A view's live interest in one cache key.
///
/// Counts as an observer of the key until dropped, so the entry survives
/// garbage collection. Reads it starts keep running after it is dropped.
pub struct Subscription<T: Cacheable> {
  client: SyncClient,
  key: CacheKey,
  state: QueryState<T>,
  changes: broadcast::Receiver<CacheKey>,
  receiver: Option<mpsc::UnboundedReceiver<Result<()>>>,
  /// Error from the last read that never reached the store
  last_error: Option<String>,
  /// The key changed while a read was still reporting back
  changed_while_reading: bool,
  mounted: bool,
}

impl<T: Cacheable> Subscription<T> {
  pub(crate) fn new(client: SyncClient, key: CacheKey) -> Self {
    let changes = client.store().subscribe();
    client.store().observe(&key);
    Self {
      client,
      key,
      state: QueryState::Idle,
      changes,
      receiver: None,
      last_error: None,
      changed_while_reading: false,
      mounted: false,
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// Pick up store changes and finished reads.
  ///
  /// The first poll reads the key unless it is already fresh or loading.
  /// Later polls revalidate when the entry goes stale, but never retry an
  /// error on their own. Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let mut dirty = false;
    let mut load = false;

    if !self.mounted {
      self.mounted = true;
      dirty = true;
      load = matches!(
        self.client.entry(&self.key).status,
        CacheStatus::Empty | CacheStatus::Stale | CacheStatus::Error
      );
    }

    let reading = self.receiver.is_some();
    let mut invalidated = false;
    loop {
      match self.changes.try_recv() {
        Ok(key) if key == self.key => invalidated = true,
        Ok(_) => {}
        // Missed transitions may include ours
        Err(broadcast::error::TryRecvError::Lagged(_)) => invalidated = true,
        Err(_) => break,
      }
    }
    if invalidated && reading {
      self.changed_while_reading = true;
    }

    let mut finished = false;
    if let Some(receiver) = &mut self.receiver {
      match receiver.try_recv() {
        Ok(outcome) => {
          self.last_error = outcome.err().map(|e| e.to_string());
          finished = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => {}
        Err(mpsc::error::TryRecvError::Disconnected) => {
          self.last_error = Some("Read was cancelled".to_string());
          finished = true;
        }
      }
    }
    if finished {
      self.receiver = None;
      dirty = true;
    }

    if !dirty && !invalidated {
      return false;
    }

    let entry = self.client.entry(&self.key);
    // A change seen mid-read may have landed after that read's own update
    let recheck = finished && std::mem::take(&mut self.changed_while_reading);
    if (invalidated || recheck) && entry.status == CacheStatus::Stale {
      load = true;
    }
    if load && self.receiver.is_none() {
      self.start_read();
    }

    self.state = self.state_from(&entry);
    true
  }

  /// Fetch the key again even if it is fresh.
  pub fn refetch(&mut self) {
    let client = self.client.clone();
    let key = self.key.clone();
    self.spawn(async move { client.refetch(&key).await.map(|_| ()) });
  }

  fn start_read(&mut self) {
    let client = self.client.clone();
    let key = self.key.clone();
    self.spawn(async move { client.load(&key).await.map(|_| ()) });
  }

  fn spawn<F>(&mut self, read: F)
  where
    F: Future<Output = Result<()>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.last_error = None;
    self.state = QueryState::Loading {
      previous: self.state.data().cloned(),
    };

    tokio::spawn(async move {
      // Ignore send errors - the subscription may have been dropped
      let _ = tx.send(read.await);
    });
  }

  fn state_from(&self, entry: &CacheEntry) -> QueryState<T> {
    let value = entry.value.as_ref().and_then(T::from_value);
    match (entry.status, value) {
      (CacheStatus::Loading, previous) => QueryState::Loading { previous },
      (CacheStatus::Fresh, Some(data)) => QueryState::Success { data, stale: false },
      (CacheStatus::Stale, Some(data)) => QueryState::Success { data, stale: true },
      (CacheStatus::Error, previous) => QueryState::Error {
        message: entry.error.clone().unwrap_or_default(),
        previous,
      },
      (CacheStatus::Fresh | CacheStatus::Stale, None) => QueryState::Error {
        message: format!("cached value for {} has an unexpected shape", self.key),
        previous: None,
      },
      (CacheStatus::Empty, _) => match (&self.last_error, &self.receiver) {
        (Some(message), _) => QueryState::Error {
          message: message.clone(),
          previous: None,
        },
        (None, Some(_)) => QueryState::Loading { previous: None },
        (None, None) => QueryState::Idle,
      },
    }
  }
}

impl<T: Cacheable> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.client.store().release(&self.key);
  }
}

/// Status of a fired write.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
  Idle,
  Pending,
  Success(T),
  Failed(String),
}

/// A write a view has fired and is waiting on.
pub struct PendingMutation<T> {
  state: MutationState<T>,
  receiver: Option<mpsc::UnboundedReceiver<Result<T>>>,
}

impl<T> Default for PendingMutation<T> {
  fn default() -> Self {
    Self {
      state: MutationState::Idle,
      receiver: None,
    }
  }
}

impl<T: Send + 'static> PendingMutation<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> &MutationState<T> {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    matches!(self.state, MutationState::Pending)
  }

  /// Run `write` on the runtime. Replaces any write still pending here,
  /// whose outcome is then ignored.
  pub fn start<F>(&mut self, write: F)
  where
    F: Future<Output = Result<T>> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.state = MutationState::Pending;

    tokio::spawn(async move {
      let _ = tx.send(write.await);
    });
  }

  /// Returns `true` once the write has finished.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(output)) => {
        self.state = MutationState::Success(output);
        self.receiver = None;
        true
      }
      Ok(Err(error)) => {
        self.state = MutationState::Failed(error.to_string());
        self.receiver = None;
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.state = MutationState::Failed("Mutation was cancelled".to_string());
        self.receiver = None;
        true
      }
    }
  }

  /// Forget a finished write.
  pub fn reset(&mut self) {
    if !self.is_pending() {
      self.state = MutationState::Idle;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CacheConfig;
  use crate::error::SyncError;
  use crate::gateway::fake::{comment, post, FakeGateway};
  use crate::gateway::{Comment, Post, PostType, Principal};
  use std::sync::Arc;
  use std::time::Duration;

  fn connected() -> (SyncClient, Arc<FakeGateway>) {
    let gateway = Arc::new(
      FakeGateway::new()
        .with_post(post(7, PostType::Question, "Teething"))
        .with_comment(comment(1, 7, None)),
    );
    let client = SyncClient::new(&CacheConfig::default(), Some(Principal::new("alice")));
    client.connect(gateway.clone());
    (client, gateway)
  }

  async fn poll_until<T: Cacheable>(
    subscription: &mut Subscription<T>,
    done: impl Fn(&QueryState<T>) -> bool,
  ) {
    for _ in 0..200 {
      subscription.poll();
      if done(subscription.state()) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("subscription for {} never settled", subscription.key());
  }

  fn settled<T>(state: &QueryState<T>) -> bool {
    matches!(state, QueryState::Success { stale: false, .. })
  }

  #[tokio::test]
  async fn test_first_poll_loads() {
    let (client, gateway) = connected();
    let mut subscription = client.subscribe::<Option<Post>>(CacheKey::Post(7));
    assert_eq!(subscription.state(), &QueryState::Idle);

    assert!(subscription.poll());
    assert!(subscription.state().is_loading());

    poll_until(&mut subscription, settled).await;
    assert_eq!(
      subscription.data().cloned().flatten().map(|p| p.id),
      Some(7)
    );
    assert_eq!(gateway.calls_to("get_post"), 1);
  }

  #[tokio::test]
  async fn test_invalidation_revalidates() {
    let (client, gateway) = connected();
    let mut subscription = client.subscribe::<Vec<Comment>>(CacheKey::Comments(7));
    poll_until(&mut subscription, settled).await;

    client
      .create_comment(7, None, "hang in there".to_string())
      .await
      .unwrap();

    poll_until(&mut subscription, |state| {
      settled(state) && state.data().map(Vec::len) == Some(2)
    })
    .await;
    assert_eq!(gateway.calls_to("get_comments_by_post"), 2);
  }

  #[tokio::test]
  async fn test_staled_during_read_revalidates_once_read_reports() {
    let (client, gateway) = connected();
    let key = CacheKey::Post(7);
    let mut subscription = client.subscribe::<Option<Post>>(key.clone());
    poll_until(&mut subscription, settled).await;

    // A read whose store update already landed but whose result is unread
    let (tx, rx) = mpsc::unbounded_channel();
    subscription.receiver = Some(rx);
    client.store().mark_stale(&key);
    subscription.poll();
    assert_eq!(gateway.calls_to("get_post"), 1);

    tx.send(Ok(())).unwrap();
    poll_until(&mut subscription, settled).await;
    assert_eq!(gateway.calls_to("get_post"), 2);
  }

  #[tokio::test]
  async fn test_error_is_not_retried_until_refetch() {
    let (client, gateway) = connected();
    gateway.fail("get_post");
    let mut subscription = client.subscribe::<Option<Post>>(CacheKey::Post(7));

    poll_until(&mut subscription, QueryState::is_error).await;
    assert!(subscription
      .state()
      .error()
      .is_some_and(|message| message.contains("get_post rejected")));

    for _ in 0..5 {
      subscription.poll();
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(gateway.calls_to("get_post"), 1);

    gateway.recover("get_post");
    subscription.refetch();
    poll_until(&mut subscription, settled).await;
    assert_eq!(gateway.calls_to("get_post"), 2);
  }

  #[tokio::test]
  async fn test_disconnected_subscription_reports_unavailable() {
    let client = SyncClient::new(&CacheConfig::default(), None);
    let mut subscription = client.subscribe::<String>(CacheKey::Guidelines);

    poll_until(&mut subscription, QueryState::is_error).await;

    assert_eq!(
      subscription.state().error(),
      Some(SyncError::Unavailable.to_string().as_str())
    );
  }

  #[tokio::test]
  async fn test_dropping_releases_the_entry() {
    let (client, _gateway) = connected();
    let mut subscription = client.subscribe::<Option<Post>>(CacheKey::Post(7));
    poll_until(&mut subscription, settled).await;

    client
      .store()
      .collect_garbage(chrono::Duration::seconds(-1));
    assert!(client.entry(&CacheKey::Post(7)).value.is_some());

    drop(subscription);
    client
      .store()
      .collect_garbage(chrono::Duration::seconds(-1));
    assert_eq!(client.store().len(), 0);
  }

  #[tokio::test]
  async fn test_pending_mutation_reports_outcome() {
    let (client, gateway) = connected();
    let mut write = PendingMutation::new();
    assert_eq!(write.state(), &MutationState::Idle);

    let writer = client.clone();
    write.start(async move { writer.create_comment(7, None, "hi".to_string()).await });
    assert!(write.is_pending());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(write.poll());
    assert!(matches!(write.state(), MutationState::Success(_)));

    gateway.fail("report_content");
    let mut report = PendingMutation::new();
    let writer = client.clone();
    report.start(async move {
      writer
        .report_content(1, true, crate::gateway::ReportReason::Spam)
        .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(report.poll());
    assert!(matches!(report.state(), MutationState::Failed(message) if message.contains("report_content rejected")));
  }
}
