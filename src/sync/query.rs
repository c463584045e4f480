//! Reads through the cache store: fresh hits, stale-while-revalidate and
//! coalesced misses.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{
  CacheEntry, CacheKey, CacheResult, CacheStatus, CacheStore, CacheValue, FetchFuture,
};
use crate::error::{Result, SyncError};

pub struct QueryCoordinator {
  store: Arc<CacheStore>,
  /// Age after which a `Fresh` entry is read as `Stale`
  stale_after: Option<chrono::Duration>,
}

impl QueryCoordinator {
  pub fn new(store: Arc<CacheStore>, stale_after: Option<chrono::Duration>) -> Self {
    Self { store, stale_after }
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  /// Entry for `key` with age-based staleness applied. Local entries never
  /// age, since no fetch could refresh them.
  pub fn current(&self, key: &CacheKey) -> CacheEntry {
    let entry = self.store.get(key);
    match self.stale_after {
      Some(max_age)
        if !key.is_local()
          && entry.status == CacheStatus::Fresh
          && entry.is_older_than(max_age, Utc::now()) =>
      {
        debug!(key = %key, "entry aged out");
        self.store.mark_stale(key);
        self.store.get(key)
      }
      _ => entry,
    }
  }

  /// Read `key`, calling `fetch` only when the cache cannot answer.
  ///
  /// Fresh entries are returned without a request. Stale entries are
  /// returned at once while a refresh starts in the background. Anything
  /// else waits for the (possibly shared) load.
  pub async fn read<F>(&self, key: &CacheKey, fetch: F) -> Result<CacheResult<CacheValue>>
  where
    F: FnOnce() -> FetchFuture,
  {
    let entry = self.current(key);
    match (entry.status, entry.value) {
      (CacheStatus::Fresh, Some(value)) => {
        Ok(CacheResult::from_cache(value, entry.fetched_at, false))
      }
      (CacheStatus::Stale, Some(value)) => {
        debug!(key = %key, "serving stale value, revalidating");
        // The load settles the store on its own task
        let _ = self.store.begin_load(key, fetch);
        Ok(CacheResult::from_cache(value, entry.fetched_at, true))
      }
      (CacheStatus::Loading, Some(value)) => {
        Ok(CacheResult::from_cache(value, entry.fetched_at, true))
      }
      _ => {
        let value = self.store.begin_load(key, fetch).await?;
        Ok(CacheResult::from_network(value))
      }
    }
  }

  /// Serve whatever usable value is cached, without any request.
  pub fn read_cached(&self, key: &CacheKey) -> Result<CacheResult<CacheValue>> {
    let entry = self.store.get(key);
    match (entry.status, entry.value) {
      (CacheStatus::Fresh | CacheStatus::Stale, Some(value)) => {
        Ok(CacheResult::offline(value, entry.fetched_at))
      }
      _ => Err(SyncError::Unavailable),
    }
  }

  /// Fetch `key` even if the cached value is fresh.
  pub async fn refetch<F>(&self, key: &CacheKey, fetch: F) -> Result<CacheValue>
  where
    F: FnOnce() -> FetchFuture,
  {
    self.store.begin_load(key, fetch).await
  }

  /// Wait for the load in flight for `key`, if there is one.
  pub async fn settle(&self, key: &CacheKey) -> Option<Result<CacheValue>> {
    let handle = self.store.inflight(key)?;
    Some(handle.await)
  }
}
