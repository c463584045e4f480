//! Two-level comment threads built from flat comment and reply lists.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use tracing::warn;

use crate::error::Result;
use crate::gateway::{Comment, CommentId, PostId};

/// Anything that can list the direct replies to a comment.
#[async_trait]
pub trait ReplySource: Send + Sync {
  async fn replies(&self, comment_id: CommentId) -> Result<Vec<Comment>>;
}

/// A top-level comment with every reply beneath it, flattened.
#[derive(Debug, Clone)]
pub struct ThreadItem {
  pub comment: Comment,
  pub replies: Result<Vec<Comment>>,
}

/// Comments without a parent, in the order given.
pub fn top_level(comments: &[Comment]) -> Vec<&Comment> {
  comments.iter().filter(|c| !c.is_reply()).collect()
}

/// All replies under `root`, depth-first in the order the source returns
/// them. Replies to replies land under the same top-level comment.
pub async fn flatten_replies(
  source: &dyn ReplySource,
  post_id: PostId,
  root: CommentId,
) -> Result<Vec<Comment>> {
  let mut visited = HashSet::from([root]);
  let mut flattened = Vec::new();
  let mut stack = vec![source.replies(root).await?.into_iter()];

  while let Some(level) = stack.last_mut() {
    let Some(reply) = level.next() else {
      stack.pop();
      continue;
    };
    if reply.post_id != post_id {
      warn!(
        comment = reply.id,
        expected = post_id,
        found = reply.post_id,
        "dropping reply that belongs to another post"
      );
      continue;
    }
    if !visited.insert(reply.id) {
      continue;
    }

    let id = reply.id;
    flattened.push(reply);
    stack.push(source.replies(id).await?.into_iter());
  }

  Ok(flattened)
}

/// [`flatten_replies`] over reply lists that are already at hand. Comments
/// whose replies are not known yet contribute no descendants.
pub fn flatten_known<'a>(
  post_id: PostId,
  root: CommentId,
  replies_of: impl Fn(CommentId) -> Option<&'a [Comment]>,
) -> Vec<&'a Comment> {
  let mut visited = HashSet::from([root]);
  let mut flattened = Vec::new();
  let mut stack = vec![replies_of(root).unwrap_or_default().iter()];

  while let Some(level) = stack.last_mut() {
    let Some(reply) = level.next() else {
      stack.pop();
      continue;
    };
    if reply.post_id != post_id || !visited.insert(reply.id) {
      continue;
    }
    flattened.push(reply);
    stack.push(replies_of(reply.id).unwrap_or_default().iter());
  }

  flattened
}

/// Pair each top-level comment of `post_id` with its replies. One failed
/// reply fetch only affects its own item.
pub async fn assemble(
  source: &dyn ReplySource,
  post_id: PostId,
  comments: &[Comment],
) -> Vec<ThreadItem> {
  let roots = top_level(comments);
  let replies = join_all(
    roots
      .iter()
      .map(|comment| flatten_replies(source, post_id, comment.id)),
  )
  .await;

  roots
    .into_iter()
    .cloned()
    .zip(replies)
    .map(|(comment, replies)| ThreadItem { comment, replies })
    .collect()
}
