//! Error types for the synchronization layer.

use thiserror::Error;

use crate::cache::CacheKey;
use crate::sync::MutationKind;

/// Every failure the synchronization layer reports to a caller.
///
/// `Clone` so one coalesced fetch outcome can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
  #[error("content service is not connected")]
  Unavailable,

  #[error("failed to load {key}: {message}")]
  Fetch { key: CacheKey, message: String },

  #[error("{kind} failed: {message}")]
  Mutation {
    kind: MutationKind,
    message: String,
    /// An optimistic change was undone
    rolled_back: bool,
  },

  #[error("reactions need a signed-in principal")]
  Anonymous,

  #[error("cached value for {key} has an unexpected shape")]
  ValueMismatch { key: CacheKey },
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
