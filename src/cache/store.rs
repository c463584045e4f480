//! The shared cache store and its per-key state machine.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::gateway::GatewayError;

use super::entry::{CacheEntry, CacheStatus};
use super::key::CacheKey;
use super::traits::CacheValue;

/// A request to the content service that produces the value for one key.
pub type FetchFuture = BoxFuture<'static, Result<CacheValue, GatewayError>>;

/// Outcome of a load, shared by every reader attached to it.
pub type LoadHandle = Shared<BoxFuture<'static, Result<CacheValue, SyncError>>>;

const CHANGE_FEED_CAPACITY: usize = 256;

struct Slot {
  entry: CacheEntry,
  /// Present exactly while `entry.status` is `Loading`
  inflight: Option<LoadHandle>,
  observers: usize,
  touched_at: DateTime<Utc>,
}

impl Slot {
  fn new(key: CacheKey) -> Self {
    Self {
      entry: CacheEntry::empty(key),
      inflight: None,
      observers: 0,
      touched_at: Utc::now(),
    }
  }
}

/// Holds the result of every read, keyed by [`CacheKey`].
///
/// The lock is never held across an await, so a transition is never
/// observed half-applied. Every transition is announced on a broadcast
/// feed that subscriptions listen to.
pub struct CacheStore {
  slots: Mutex<HashMap<CacheKey, Slot>>,
  changes: broadcast::Sender<CacheKey>,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
    Self {
      slots: Mutex::new(HashMap::new()),
      changes,
    }
  }

  /// Current entry for `key`, creating an `Empty` one if absent.
  pub fn get(&self, key: &CacheKey) -> CacheEntry {
    let mut slots = self.slots.lock();
    let slot = slots
      .entry(key.clone())
      .or_insert_with(|| Slot::new(key.clone()));
    slot.touched_at = Utc::now();
    slot.entry.clone()
  }

  /// Start loading `key`, or join the load already in flight.
  ///
  /// At most one fetch per key runs at a time: while the entry is `Loading`
  /// the `fetch` factory is not called and the existing handle is returned.
  /// The fetch runs on its own task and settles the entry even if every
  /// caller stops waiting for it.
  pub fn begin_load<F>(self: &Arc<Self>, key: &CacheKey, fetch: F) -> LoadHandle
  where
    F: FnOnce() -> FetchFuture,
  {
    let mut slots = self.slots.lock();
    let slot = slots
      .entry(key.clone())
      .or_insert_with(|| Slot::new(key.clone()));

    if let Some(handle) = &slot.inflight {
      debug!(key = %key, "joining in-flight load");
      return handle.clone();
    }

    let request = fetch();
    let store = Arc::clone(self);
    let task_key = key.clone();
    let task = tokio::spawn(async move {
      let outcome = AssertUnwindSafe(request)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(GatewayError::new("fetch panicked")));

      match outcome {
        Ok(value) => {
          store.resolve(&task_key, value.clone());
          Ok(value)
        }
        Err(err) => {
          let message = err.to_string();
          store.fail(&task_key, message.clone());
          Err(SyncError::Fetch {
            key: task_key,
            message,
          })
        }
      }
    });

    let join_key = key.clone();
    let handle = async move {
      task.await.unwrap_or_else(|err| {
        Err(SyncError::Fetch {
          key: join_key,
          message: err.to_string(),
        })
      })
    }
    .boxed()
    .shared();

    slot.entry.status = CacheStatus::Loading;
    slot.inflight = Some(handle.clone());
    slot.touched_at = Utc::now();
    drop(slots);

    debug!(key = %key, "load started");
    self.notify(key);
    handle
  }

  /// The handle of the load in flight for `key`, if any.
  pub fn inflight(&self, key: &CacheKey) -> Option<LoadHandle> {
    self
      .slots
      .lock()
      .get(key)
      .and_then(|slot| slot.inflight.clone())
  }

  /// Store a fetched value: the entry becomes `Fresh`.
  pub fn resolve(&self, key: &CacheKey, value: CacheValue) {
    self.update(key, |slot| {
      slot.entry.status = CacheStatus::Fresh;
      slot.entry.value = Some(value);
      slot.entry.fetched_at = Some(Utc::now());
      slot.entry.error = None;
      slot.inflight = None;
    });
  }

  /// Record a failed fetch. The previous value, if any, is kept.
  pub fn fail(&self, key: &CacheKey, error: impl Into<String>) {
    let error = error.into();
    warn!(key = %key, error = %error, "load failed");
    self.update(key, |slot| {
      slot.entry.status = CacheStatus::Error;
      slot.entry.error = Some(error);
      slot.inflight = None;
    });
  }

  /// `Fresh → Stale`. Returns whether the entry changed; other states are left alone.
  pub fn mark_stale(&self, key: &CacheKey) -> bool {
    !self.mark_stale_where(|candidate| candidate == key).is_empty()
  }

  /// Mark every `Fresh` entry whose key satisfies `predicate` as `Stale`.
  pub fn mark_stale_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> Vec<CacheKey> {
    let staled: Vec<CacheKey> = {
      let mut slots = self.slots.lock();
      slots
        .iter_mut()
        .filter(|(key, slot)| slot.entry.status == CacheStatus::Fresh && predicate(key))
        .map(|(key, slot)| {
          slot.entry.status = CacheStatus::Stale;
          key.clone()
        })
        .collect()
    };

    for key in &staled {
      self.notify(key);
    }
    staled
  }

  /// Write a value directly, bypassing the load protocol.
  ///
  /// Reserved for optimistic writes and their rollback. A load in flight
  /// keeps its `Loading` status and will overwrite the value when it lands.
  pub fn set_value(&self, key: &CacheKey, value: CacheValue) {
    self.update(key, |slot| {
      if slot.entry.status != CacheStatus::Loading {
        slot.entry.status = CacheStatus::Fresh;
      }
      slot.entry.value = Some(value);
      slot.entry.fetched_at = Some(Utc::now());
      slot.entry.error = None;
    });
  }

  /// Give a value-less entry its initial value; entries that already hold
  /// one are returned untouched.
  pub fn seed(&self, key: &CacheKey, initial: impl FnOnce() -> CacheValue) -> CacheEntry {
    let seeded = {
      let mut slots = self.slots.lock();
      let slot = slots
        .entry(key.clone())
        .or_insert_with(|| Slot::new(key.clone()));
      slot.touched_at = Utc::now();
      if slot.entry.value.is_some() {
        return slot.entry.clone();
      }

      if slot.entry.status != CacheStatus::Loading {
        slot.entry.status = CacheStatus::Fresh;
      }
      slot.entry.value = Some(initial());
      slot.entry.fetched_at = Some(Utc::now());
      slot.entry.clone()
    };

    self.notify(key);
    seeded
  }

  /// Register a view interested in `key`. Observed entries are never collected.
  pub fn observe(&self, key: &CacheKey) {
    let mut slots = self.slots.lock();
    let slot = slots
      .entry(key.clone())
      .or_insert_with(|| Slot::new(key.clone()));
    slot.observers += 1;
    slot.touched_at = Utc::now();
  }

  pub fn release(&self, key: &CacheKey) {
    if let Some(slot) = self.slots.lock().get_mut(key) {
      slot.observers = slot.observers.saturating_sub(1);
      slot.touched_at = Utc::now();
    }
  }

  /// Drop entries nobody observes that have not been touched for `max_idle`.
  /// Loading entries are kept so their fetch has somewhere to land, and
  /// local entries are kept because nothing could fetch them back.
  pub fn collect_garbage(&self, max_idle: chrono::Duration) -> usize {
    let now = Utc::now();
    let mut slots = self.slots.lock();
    let before = slots.len();
    slots.retain(|key, slot| {
      key.is_local()
        || slot.observers > 0
        || slot.entry.status == CacheStatus::Loading
        || now - slot.touched_at <= max_idle
    });
    let collected = before - slots.len();
    if collected > 0 {
      debug!(collected, remaining = slots.len(), "collected idle cache entries");
    }
    collected
  }

  pub fn len(&self) -> usize {
    self.slots.lock().len()
  }

  /// Feed of keys whose entry just changed.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
    self.changes.subscribe()
  }

  fn update(&self, key: &CacheKey, apply: impl FnOnce(&mut Slot)) {
    {
      let mut slots = self.slots.lock();
      let slot = slots
        .entry(key.clone())
        .or_insert_with(|| Slot::new(key.clone()));
      apply(slot);
      slot.touched_at = Utc::now();
    }
    self.notify(key);
  }

  fn notify(&self, key: &CacheKey) {
    // No receivers is fine
    let _ = self.changes.send(key.clone());
  }
}
