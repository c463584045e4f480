use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;

use super::types::{
  Comment, CommentId, NewPost, Post, PostId, PostType, Principal, ReactionType, ReportReason,
  UserProfile,
};
use super::{ContentGateway, GatewayError, GatewayResult};

/// Content service client speaking JSON over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedResponse {
  id: u64,
}

#[derive(Deserialize)]
struct CountResponse {
  count: u64,
}

#[derive(Deserialize)]
struct GuidelinesResponse {
  text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewComment<'a> {
  parent_comment_id: Option<CommentId>,
  body: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewReport {
  content_id: u64,
  is_comment: bool,
  reason: ReportReason,
}

impl HttpGateway {
  pub fn new(config: &Config) -> Result<Self> {
    let base = config.gateway.base_url()?;
    let client = reqwest::Client::builder()
      .user_agent(concat!("threadline/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token: Config::api_token(),
    })
  }

  fn request(&self, method: Method, path: &str) -> GatewayResult<RequestBuilder> {
    let url = endpoint(&self.base, path)?;
    let mut request = self.client.request(method, url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    Ok(request)
  }

  async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
    check(request.send().await?).await
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> GatewayResult<T> {
    let request = self.request(Method::GET, path)?.query(query);
    let response = self.send(request).await?;
    Ok(response.json().await?)
  }

  /// Like `get_json`, but a 404 means "no such record" rather than a failure.
  async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<Option<T>> {
    let response = self.request(Method::GET, path)?.send().await?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let response = check(response).await?;
    Ok(Some(response.json().await?))
  }

  async fn write<B: Serialize + ?Sized>(
    &self,
    method: Method,
    path: &str,
    body: Option<&B>,
  ) -> GatewayResult<Response> {
    let mut request = self.request(method, path)?;
    if let Some(body) = body {
      request = request.json(body);
    }
    self.send(request).await
  }
}

/// Turn any non-2xx status into an error carrying the response body.
async fn check(response: Response) -> GatewayResult<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let path = response.url().path().to_string();
  let body = response.text().await.unwrap_or_default();
  Err(GatewayError::new(format!(
    "{} from {}: {}",
    status,
    path,
    body.trim()
  )))
}

/// Join a relative endpoint path onto the service base URL.
fn endpoint(base: &Url, path: &str) -> GatewayResult<Url> {
  base
    .join(path)
    .map_err(|e| GatewayError::new(format!("invalid endpoint {}: {}", path, e)))
}

fn reaction_path(post_id: PostId, reaction: ReactionType) -> String {
  format!("posts/{}/reactions/{}", post_id, reaction.as_str())
}

#[async_trait]
impl ContentGateway for HttpGateway {
  async fn get_post(&self, id: PostId) -> GatewayResult<Option<Post>> {
    self.get_optional(&format!("posts/{}", id)).await
  }

  async fn get_all_posts_sorted(&self, oldest_first: bool) -> GatewayResult<Vec<Post>> {
    self
      .get_json("posts", &[("oldFirst", oldest_first.to_string())])
      .await
  }

  async fn get_posts_by_type(&self, post_type: Option<PostType>) -> GatewayResult<Vec<Post>> {
    let query: Vec<(&str, String)> = post_type
      .map(|t| vec![("type", t.as_str().to_string())])
      .unwrap_or_default();
    self.get_json("posts", &query).await
  }

  async fn search_posts(&self, keyword: &str) -> GatewayResult<Vec<Post>> {
    self
      .get_json("posts/search", &[("q", keyword.to_string())])
      .await
  }

  async fn get_comments_by_post(&self, post_id: PostId) -> GatewayResult<Vec<Comment>> {
    self
      .get_json(&format!("posts/{}/comments", post_id), &[])
      .await
  }

  async fn get_replies_by_comment(&self, comment_id: CommentId) -> GatewayResult<Vec<Comment>> {
    self
      .get_json(&format!("comments/{}/replies", comment_id), &[])
      .await
  }

  async fn count_post_reactions(
    &self,
    post_id: PostId,
    reaction: ReactionType,
  ) -> GatewayResult<u64> {
    let response: CountResponse = self.get_json(&reaction_path(post_id, reaction), &[]).await?;
    Ok(response.count)
  }

  async fn get_user_profile(&self, principal: &Principal) -> GatewayResult<Option<UserProfile>> {
    self
      .get_optional(&format!("profiles/{}", principal.as_str()))
      .await
  }

  async fn get_community_guidelines(&self) -> GatewayResult<String> {
    let response: GuidelinesResponse = self.get_json("guidelines", &[]).await?;
    Ok(response.text)
  }

  async fn create_post(&self, post: &NewPost) -> GatewayResult<PostId> {
    let response = self.write(Method::POST, "posts", Some(post)).await?;
    let created: CreatedResponse = response.json().await?;
    Ok(created.id)
  }

  async fn create_comment(
    &self,
    post_id: PostId,
    parent_comment_id: Option<CommentId>,
    body: &str,
  ) -> GatewayResult<CommentId> {
    let comment = NewComment {
      parent_comment_id,
      body,
    };
    let response = self
      .write(
        Method::POST,
        &format!("posts/{}/comments", post_id),
        Some(&comment),
      )
      .await?;
    let created: CreatedResponse = response.json().await?;
    Ok(created.id)
  }

  async fn add_reaction(&self, post_id: PostId, reaction: ReactionType) -> GatewayResult<()> {
    self
      .write::<()>(Method::PUT, &reaction_path(post_id, reaction), None)
      .await?;
    Ok(())
  }

  async fn remove_reaction(&self, post_id: PostId, reaction: ReactionType) -> GatewayResult<()> {
    self
      .write::<()>(Method::DELETE, &reaction_path(post_id, reaction), None)
      .await?;
    Ok(())
  }

  async fn report_content(
    &self,
    content_id: u64,
    is_comment: bool,
    reason: ReportReason,
  ) -> GatewayResult<()> {
    let report = NewReport {
      content_id,
      is_comment,
      reason,
    };
    self.write(Method::POST, "reports", Some(&report)).await?;
    Ok(())
  }

  async fn save_caller_user_profile(&self, profile: &UserProfile) -> GatewayResult<()> {
    self.write(Method::PUT, "profile", Some(profile)).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_joins_under_base_path() {
    let base = Url::parse("https://community.example.org/api/").unwrap();

    assert_eq!(
      endpoint(&base, "posts/7/comments").unwrap().as_str(),
      "https://community.example.org/api/posts/7/comments"
    );
  }

  #[test]
  fn test_reaction_path() {
    assert_eq!(
      reaction_path(12, ReactionType::Support),
      "posts/12/reactions/support"
    );
  }

  #[test]
  fn test_new_comment_body() {
    let body = serde_json::to_value(NewComment {
      parent_comment_id: Some(3),
      body: "thanks",
    })
    .unwrap();

    assert_eq!(body["parentCommentId"], 3);
    assert_eq!(body["body"], "thanks");
  }
}
