//! In-memory content service for tests.
//!
//! Every call is recorded before the first suspension point and then yields
//! once, so concurrent callers interleave the way they would against a real
//! network round trip.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use super::types::{
  Comment, CommentId, NewPost, Post, PostId, PostType, Principal, ReactionType, ReportReason,
  UserProfile,
};
use super::{ContentGateway, GatewayError, GatewayResult};

#[derive(Default)]
struct State {
  posts: Vec<Post>,
  comments: Vec<Comment>,
  reactions: BTreeMap<(PostId, ReactionType), u64>,
  profiles: BTreeMap<Principal, UserProfile>,
  next_id: u64,
}

#[derive(Default)]
pub struct FakeGateway {
  state: Mutex<State>,
  calls: Mutex<Vec<(&'static str, String)>>,
  failing: Mutex<HashSet<&'static str>>,
}

pub fn post(id: PostId, post_type: PostType, title: &str) -> Post {
  Post {
    id,
    post_type,
    title: title.to_string(),
    body: format!("{} body", title),
    tags: Vec::new(),
    author: Principal::new("author"),
    created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
  }
}

pub fn comment(id: CommentId, post_id: PostId, parent_comment_id: Option<CommentId>) -> Comment {
  Comment {
    id,
    post_id,
    parent_comment_id,
    body: format!("comment {}", id),
    author: Principal::new("author"),
    created_at: Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap(),
  }
}

impl FakeGateway {
  pub fn new() -> Self {
    let gateway = Self::default();
    gateway.state.lock().next_id = 1000;
    gateway
  }

  pub fn with_post(self, post: Post) -> Self {
    self.state.lock().posts.push(post);
    self
  }

  pub fn with_comment(self, comment: Comment) -> Self {
    self.state.lock().comments.push(comment);
    self
  }

  /// Make every subsequent call to `op` fail until `recover` is called.
  pub fn fail(&self, op: &'static str) {
    self.failing.lock().insert(op);
  }

  pub fn recover(&self, op: &'static str) {
    self.failing.lock().remove(op);
  }

  pub fn calls(&self) -> Vec<String> {
    self
      .calls
      .lock()
      .iter()
      .map(|(op, detail)| format!("{} {}", op, detail))
      .collect()
  }

  pub fn calls_to(&self, op: &str) -> usize {
    self.calls.lock().iter().filter(|(name, _)| *name == op).count()
  }

  async fn record(&self, op: &'static str, detail: String) -> GatewayResult<()> {
    self.calls.lock().push((op, detail));
    tokio::task::yield_now().await;
    if self.failing.lock().contains(op) {
      return Err(GatewayError::new(format!("{} rejected", op)));
    }
    Ok(())
  }

  fn next_id(&self) -> u64 {
    let mut state = self.state.lock();
    state.next_id += 1;
    state.next_id
  }
}

#[async_trait]
impl ContentGateway for FakeGateway {
  async fn get_post(&self, id: PostId) -> GatewayResult<Option<Post>> {
    self.record("get_post", id.to_string()).await?;
    Ok(self.state.lock().posts.iter().find(|p| p.id == id).cloned())
  }

  async fn get_all_posts_sorted(&self, oldest_first: bool) -> GatewayResult<Vec<Post>> {
    self
      .record("get_all_posts_sorted", oldest_first.to_string())
      .await?;
    let mut posts = self.state.lock().posts.clone();
    posts.sort_by_key(|p| p.created_at);
    if !oldest_first {
      posts.reverse();
    }
    Ok(posts)
  }

  async fn get_posts_by_type(&self, post_type: Option<PostType>) -> GatewayResult<Vec<Post>> {
    self
      .record("get_posts_by_type", format!("{:?}", post_type))
      .await?;
    Ok(
      self
        .state
        .lock()
        .posts
        .iter()
        .filter(|p| post_type.map_or(true, |t| p.post_type == t))
        .cloned()
        .collect(),
    )
  }

  async fn search_posts(&self, keyword: &str) -> GatewayResult<Vec<Post>> {
    self.record("search_posts", keyword.to_string()).await?;
    let needle = keyword.to_lowercase();
    Ok(
      self
        .state
        .lock()
        .posts
        .iter()
        .filter(|p| p.title.to_lowercase().contains(&needle) || p.body.to_lowercase().contains(&needle))
        .cloned()
        .collect(),
    )
  }

  async fn get_comments_by_post(&self, post_id: PostId) -> GatewayResult<Vec<Comment>> {
    self
      .record("get_comments_by_post", post_id.to_string())
      .await?;
    Ok(
      self
        .state
        .lock()
        .comments
        .iter()
        .filter(|c| c.post_id == post_id)
        .cloned()
        .collect(),
    )
  }

  async fn get_replies_by_comment(&self, comment_id: CommentId) -> GatewayResult<Vec<Comment>> {
    self
      .record("get_replies_by_comment", comment_id.to_string())
      .await?;
    Ok(
      self
        .state
        .lock()
        .comments
        .iter()
        .filter(|c| c.parent_comment_id == Some(comment_id))
        .cloned()
        .collect(),
    )
  }

  async fn count_post_reactions(
    &self,
    post_id: PostId,
    reaction: ReactionType,
  ) -> GatewayResult<u64> {
    self
      .record("count_post_reactions", format!("{} {}", post_id, reaction.as_str()))
      .await?;
    Ok(
      self
        .state
        .lock()
        .reactions
        .get(&(post_id, reaction))
        .copied()
        .unwrap_or(0),
    )
  }

  async fn get_user_profile(&self, principal: &Principal) -> GatewayResult<Option<UserProfile>> {
    self
      .record("get_user_profile", principal.to_string())
      .await?;
    Ok(self.state.lock().profiles.get(principal).cloned())
  }

  async fn get_community_guidelines(&self) -> GatewayResult<String> {
    self
      .record("get_community_guidelines", String::new())
      .await?;
    Ok("Be kind.".to_string())
  }

  async fn create_post(&self, post: &NewPost) -> GatewayResult<PostId> {
    self.record("create_post", post.title.clone()).await?;
    let id = self.next_id();
    let mut created = self::post(id, post.post_type, &post.title);
    created.body = post.body.clone();
    created.tags = post.tags.clone();
    self.state.lock().posts.push(created);
    Ok(id)
  }

  async fn create_comment(
    &self,
    post_id: PostId,
    parent_comment_id: Option<CommentId>,
    body: &str,
  ) -> GatewayResult<CommentId> {
    self
      .record("create_comment", format!("{} {:?}", post_id, parent_comment_id))
      .await?;
    let id = self.next_id();
    let mut created = comment(id, post_id, parent_comment_id);
    created.body = body.to_string();
    self.state.lock().comments.push(created);
    Ok(id)
  }

  async fn add_reaction(&self, post_id: PostId, reaction: ReactionType) -> GatewayResult<()> {
    self
      .record("add_reaction", format!("{} {}", post_id, reaction.as_str()))
      .await?;
    *self
      .state
      .lock()
      .reactions
      .entry((post_id, reaction))
      .or_insert(0) += 1;
    Ok(())
  }

  async fn remove_reaction(&self, post_id: PostId, reaction: ReactionType) -> GatewayResult<()> {
    self
      .record("remove_reaction", format!("{} {}", post_id, reaction.as_str()))
      .await?;
    if let Some(count) = self.state.lock().reactions.get_mut(&(post_id, reaction)) {
      *count = count.saturating_sub(1);
    }
    Ok(())
  }

  async fn report_content(
    &self,
    content_id: u64,
    is_comment: bool,
    reason: ReportReason,
  ) -> GatewayResult<()> {
    self
      .record(
        "report_content",
        format!("{} {} {:?}", content_id, is_comment, reason),
      )
      .await
  }

  async fn save_caller_user_profile(&self, profile: &UserProfile) -> GatewayResult<()> {
    self
      .record("save_caller_user_profile", profile.name.clone())
      .await?;
    self
      .state
      .lock()
      .profiles
      .insert(Principal::new("alice"), profile.clone());
    Ok(())
  }
}
