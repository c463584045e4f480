//! Boundary to the remote content service.
//!
//! Every operation is a single request/response call. There is no batching
//! and no push channel; anything the client knows about remote state it
//! learned through one of these calls.

#[cfg(test)]
pub mod fake;
mod http;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpGateway;
pub use types::{
  Comment, CommentId, NewPost, Post, PostId, PostType, Principal, ReactionType, ReportReason,
  UserProfile,
};

/// Failure reported by the content service. The service guarantees no
/// structure beyond a message.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct GatewayError(String);

impl GatewayError {
  pub fn new(message: impl Into<String>) -> Self {
    Self(message.into())
  }
}

impl From<reqwest::Error> for GatewayError {
  fn from(err: reqwest::Error) -> Self {
    Self(err.to_string())
  }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait ContentGateway: Send + Sync {
  async fn get_post(&self, id: PostId) -> GatewayResult<Option<Post>>;

  async fn get_all_posts_sorted(&self, oldest_first: bool) -> GatewayResult<Vec<Post>>;

  async fn get_posts_by_type(&self, post_type: Option<PostType>) -> GatewayResult<Vec<Post>>;

  async fn search_posts(&self, keyword: &str) -> GatewayResult<Vec<Post>>;

  async fn get_comments_by_post(&self, post_id: PostId) -> GatewayResult<Vec<Comment>>;

  async fn get_replies_by_comment(&self, comment_id: CommentId) -> GatewayResult<Vec<Comment>>;

  async fn count_post_reactions(
    &self,
    post_id: PostId,
    reaction: ReactionType,
  ) -> GatewayResult<u64>;

  async fn get_user_profile(&self, principal: &Principal) -> GatewayResult<Option<UserProfile>>;

  async fn get_community_guidelines(&self) -> GatewayResult<String>;

  async fn create_post(&self, post: &NewPost) -> GatewayResult<PostId>;

  async fn create_comment(
    &self,
    post_id: PostId,
    parent_comment_id: Option<CommentId>,
    body: &str,
  ) -> GatewayResult<CommentId>;

  async fn add_reaction(&self, post_id: PostId, reaction: ReactionType) -> GatewayResult<()>;

  async fn remove_reaction(&self, post_id: PostId, reaction: ReactionType) -> GatewayResult<()>;

  async fn report_content(
    &self,
    content_id: u64,
    is_comment: bool,
    reason: ReportReason,
  ) -> GatewayResult<()>;

  async fn save_caller_user_profile(&self, profile: &UserProfile) -> GatewayResult<()>;
}
