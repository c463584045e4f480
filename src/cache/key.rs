use std::fmt;

use crate::gateway::{CommentId, PostId, PostType, Principal, ReactionType};

/// Filter and search parameters for a post list.
///
/// The keyword is trimmed on construction so that inputs differing only in
/// surrounding whitespace share one cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostQuery {
  post_type: Option<PostType>,
  keyword: String,
  oldest_first: bool,
}

impl PostQuery {
  pub fn new(post_type: Option<PostType>, keyword: &str) -> Self {
    Self {
      post_type,
      keyword: keyword.trim().to_string(),
      oldest_first: false,
    }
  }

  pub fn oldest_first(mut self, oldest_first: bool) -> Self {
    self.oldest_first = oldest_first;
    self
  }

  pub fn post_type(&self) -> Option<PostType> {
    self.post_type
  }

  /// The search keyword, if one was given.
  pub fn keyword(&self) -> Option<&str> {
    if self.keyword.is_empty() {
      None
    } else {
      Some(&self.keyword)
    }
  }

  pub fn is_oldest_first(&self) -> bool {
    self.oldest_first
  }
}

/// Structural identity of one cached read.
///
/// Two keys are the same entry exactly when they have the same kind and the
/// same discriminators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
  Post(PostId),
  PostsByFilter(PostQuery),
  Comments(PostId),
  Replies(CommentId),
  ReactionCount(PostId, ReactionType),
  /// Reactions the caller is locally known to have toggled on. Never
  /// fetched; seeded empty and written only by optimistic toggles.
  UserReactions(PostId, Principal),
  Profile(Principal),
  Guidelines,
}

impl CacheKey {
  pub fn is_post_list(&self) -> bool {
    matches!(self, Self::PostsByFilter(_))
  }

  /// Whether the value lives only on this client.
  pub fn is_local(&self) -> bool {
    matches!(self, Self::UserReactions(..))
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Post(id) => write!(f, "post:{}", id),
      Self::PostsByFilter(query) => write!(
        f,
        "posts:{}:{}:{}",
        query.post_type().map(|t| t.as_str()).unwrap_or("all"),
        query.keyword().unwrap_or(""),
        if query.is_oldest_first() { "oldest" } else { "newest" }
      ),
      Self::Comments(post_id) => write!(f, "comments:{}", post_id),
      Self::Replies(comment_id) => write!(f, "replies:{}", comment_id),
      Self::ReactionCount(post_id, reaction) => {
        write!(f, "reaction_count:{}:{}", post_id, reaction.as_str())
      }
      Self::UserReactions(post_id, principal) => {
        write!(f, "user_reactions:{}:{}", post_id, principal)
      }
      Self::Profile(principal) => write!(f, "profile:{}", principal),
      Self::Guidelines => f.write_str("guidelines"),
    }
  }
}
