use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PostId = u64;
pub type CommentId = u64;

/// Opaque identity of a community member, as issued by the content service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for Principal {
  fn from(id: String) -> Self {
    Self(id)
  }
}

impl fmt::Display for Principal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
  Question,
  Story,
}

impl PostType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Question => "question",
      Self::Story => "story",
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
  Support,
  Helpful,
}

impl ReactionType {
  pub const ALL: [ReactionType; 2] = [ReactionType::Support, ReactionType::Helpful];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Support => "support",
      Self::Helpful => "helpful",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum ReportReason {
  Spam,
  Abuse,
  OffTopic,
  Other,
}

/// A question or story posted to the community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id: PostId,
  pub post_type: PostType,
  pub title: String,
  pub body: String,
  #[serde(default)]
  pub tags: Vec<String>,
  pub author: Principal,
  pub created_at: DateTime<Utc>,
}

/// A comment on a post. Replies carry the id of the comment they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: CommentId,
  pub post_id: PostId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_comment_id: Option<CommentId>,
  pub body: String,
  pub author: Principal,
  pub created_at: DateTime<Utc>,
}

impl Comment {
  pub fn is_reply(&self) -> bool {
    self.parent_comment_id.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub name: String,
}

/// Fields submitted when creating a post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
  pub post_type: PostType,
  pub title: String,
  pub body: String,
  pub tags: Vec<String>,
}
