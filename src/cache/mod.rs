//! Client-side cache of content service reads.
//!
//! This module provides the shared store that:
//! - Keys every read result by a structural [`CacheKey`]
//! - Tracks a lifecycle per entry (empty, loading, fresh, stale, error)
//! - Runs at most one fetch per key and lets concurrent readers join it
//! - Announces every transition to subscribers

mod entry;
mod key;
mod store;
mod traits;

pub use entry::{CacheEntry, CacheStatus};
pub use key::{CacheKey, PostQuery};
pub use store::{CacheStore, FetchFuture, LoadHandle};
pub use traits::{CacheResult, CacheSource, CacheValue, Cacheable, ReactionSet};
