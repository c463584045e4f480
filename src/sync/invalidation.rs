//! Which cached reads a completed write makes untrustworthy.

use std::fmt;
use tracing::debug;

use crate::cache::{CacheKey, CacheStore};
use crate::gateway::{CommentId, PostId, Principal, ReactionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  CreatePost,
  CreateComment,
  ToggleReaction,
  SubmitReport,
  SaveProfile,
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::CreatePost => "create post",
      Self::CreateComment => "create comment",
      Self::ToggleReaction => "toggle reaction",
      Self::SubmitReport => "submit report",
      Self::SaveProfile => "save profile",
    })
  }
}

/// A write, with the arguments its invalidations depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  CreatePost,
  CreateComment {
    post_id: PostId,
    parent_comment_id: Option<CommentId>,
  },
  ToggleReaction {
    post_id: PostId,
    reaction: ReactionType,
  },
  SubmitReport,
  /// `principal` is the caller, when known
  SaveProfile { principal: Option<Principal> },
}

/// A set of cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  Exact(CacheKey),
  /// Every cached post list, whatever its filter or search
  AllPostLists,
}

impl KeyPattern {
  pub fn matches(&self, key: &CacheKey) -> bool {
    match self {
      Self::Exact(exact) => exact == key,
      Self::AllPostLists => key.is_post_list(),
    }
  }
}

impl Mutation {
  pub fn kind(&self) -> MutationKind {
    match self {
      Self::CreatePost => MutationKind::CreatePost,
      Self::CreateComment { .. } => MutationKind::CreateComment,
      Self::ToggleReaction { .. } => MutationKind::ToggleReaction,
      Self::SubmitReport => MutationKind::SubmitReport,
      Self::SaveProfile { .. } => MutationKind::SaveProfile,
    }
  }

  /// The keys this write stales once it has succeeded.
  ///
  /// A new post may belong in any filtered or searched list, and the client
  /// cannot evaluate the service's predicates, so every list is staled.
  pub fn invalidates(&self) -> Vec<KeyPattern> {
    match self {
      Self::CreatePost => vec![KeyPattern::AllPostLists],
      Self::CreateComment {
        post_id,
        parent_comment_id,
      } => {
        let mut patterns = vec![KeyPattern::Exact(CacheKey::Comments(*post_id))];
        if let Some(parent) = parent_comment_id {
          patterns.push(KeyPattern::Exact(CacheKey::Replies(*parent)));
        }
        patterns
      }
      Self::ToggleReaction { post_id, reaction } => {
        vec![KeyPattern::Exact(CacheKey::ReactionCount(*post_id, *reaction))]
      }
      Self::SubmitReport => Vec::new(),
      Self::SaveProfile { principal } => principal
        .iter()
        .map(|p| KeyPattern::Exact(CacheKey::Profile(p.clone())))
        .collect(),
    }
  }
}

/// Stale every cached key `mutation` affects. Returns the keys that changed.
pub fn invalidate(store: &CacheStore, mutation: &Mutation) -> Vec<CacheKey> {
  let patterns = mutation.invalidates();
  if patterns.is_empty() {
    return Vec::new();
  }

  let staled = store.mark_stale_where(|key| patterns.iter().any(|p| p.matches(key)));
  debug!(
    mutation = %mutation.kind(),
    staled = staled.len(),
    "invalidated dependent reads"
  );
  staled
}
