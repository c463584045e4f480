//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::gateway::{Comment, Post, ReactionType, UserProfile};

pub type ReactionSet = BTreeSet<ReactionType>;

/// Any value the cache can hold. Each key kind maps to exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
  Post(Option<Post>),
  Posts(Vec<Post>),
  Comments(Vec<Comment>),
  Count(u64),
  Reactions(ReactionSet),
  Profile(Option<UserProfile>),
  Text(String),
}

/// Types that can be stored in and read back out of a [`CacheValue`].
pub trait Cacheable: Clone + Send + Sync + 'static {
  fn into_value(self) -> CacheValue;

  /// Returns `None` if the value holds a different variant.
  fn from_value(value: &CacheValue) -> Option<Self>;
}

macro_rules! cacheable {
  ($ty:ty => $variant:ident) => {
    impl Cacheable for $ty {
      fn into_value(self) -> CacheValue {
        CacheValue::$variant(self)
      }

      fn from_value(value: &CacheValue) -> Option<Self> {
        match value {
          CacheValue::$variant(inner) => Some(inner.clone()),
          _ => None,
        }
      }
    }
  };
}

cacheable!(Option<Post> => Post);
cacheable!(Vec<Post> => Posts);
cacheable!(Vec<Comment> => Comments);
cacheable!(u64 => Count);
cacheable!(ReactionSet => Reactions);
cacheable!(Option<UserProfile> => Profile);
cacheable!(String => Text);

/// Result from a cache read, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched (if served from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>, revalidating: bool) -> Self {
    Self {
      data,
      source: if revalidating {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at,
    }
  }

  /// Cached data served while no content service is connected.
  pub fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }
}

/// Indicates where read data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched by this read (or by the in-flight fetch it joined)
  Network,
  /// Served from cache without any request
  CacheFresh,
  /// Served from cache while a background refetch runs
  CacheStale,
  /// No content service connected, serving what the cache has
  Offline,
}
