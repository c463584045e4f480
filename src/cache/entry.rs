use chrono::{DateTime, Utc};

use super::key::CacheKey;
use super::traits::CacheValue;

/// Lifecycle of one cache entry.
///
/// ```text
/// Empty ──begin_load──▶ Loading ──resolve──▶ Fresh ──mark_stale──▶ Stale
///                          │                   ▲                     │
///                          └──fail──▶ Error ───┴─────begin_load──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
  Empty,
  Loading,
  Fresh,
  Stale,
  Error,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub status: CacheStatus,
  /// Last value written; kept through `Stale`, `Loading` and `Error`
  pub value: Option<CacheValue>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}

impl CacheEntry {
  pub fn empty(key: CacheKey) -> Self {
    Self {
      key,
      status: CacheStatus::Empty,
      value: None,
      fetched_at: None,
      error: None,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status == CacheStatus::Loading
  }

  /// Whether `fetched_at` is further back than `max_age`.
  pub fn is_older_than(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
    self
      .fetched_at
      .map(|fetched_at| now - fetched_at > max_age)
      .unwrap_or(true)
  }
}
