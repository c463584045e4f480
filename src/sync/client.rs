//! Content client with transparent caching, optimistic reactions and
//! invalidation.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::cache::{
  CacheEntry, CacheKey, CacheResult, CacheStore, CacheValue, Cacheable, FetchFuture, PostQuery,
  ReactionSet,
};
use crate::config::CacheConfig;
use crate::error::{Result, SyncError};
use crate::gateway::{
  Comment, CommentId, ContentGateway, GatewayError, NewPost, Post, PostId, Principal,
  ReactionType, ReportReason, UserProfile,
};
use crate::handles::Subscription;

use super::invalidation::Mutation;
use super::mutation::MutationCoordinator;
use super::query::QueryCoordinator;
use super::thread::{assemble, ReplySource, ThreadItem};

/// Every read and write a view performs goes through this client.
///
/// Cheap to clone; clones share one cache store and one connection.
#[derive(Clone)]
pub struct SyncClient {
  store: Arc<CacheStore>,
  queries: Arc<QueryCoordinator>,
  mutations: MutationCoordinator,
  gateway: Arc<RwLock<Option<Arc<dyn ContentGateway>>>>,
  principal: Option<Principal>,
}

impl SyncClient {
  /// A client that is not connected yet. Reads serve what is cached and
  /// writes are rejected until [`SyncClient::connect`] is called.
  pub fn new(cache: &CacheConfig, principal: Option<Principal>) -> Self {
    let store = Arc::new(CacheStore::new());
    Self {
      queries: Arc::new(QueryCoordinator::new(
        Arc::clone(&store),
        cache.stale_after(),
      )),
      mutations: MutationCoordinator::new(Arc::clone(&store)),
      store,
      gateway: Arc::new(RwLock::new(None)),
      principal,
    }
  }

  pub fn connect(&self, gateway: Arc<dyn ContentGateway>) {
    info!("content service connected");
    *self.gateway.write() = Some(gateway);
  }

  pub fn disconnect(&self) {
    info!("content service disconnected");
    *self.gateway.write() = None;
  }

  pub fn is_connected(&self) -> bool {
    self.gateway.read().is_some()
  }

  pub fn principal(&self) -> Option<&Principal> {
    self.principal.as_ref()
  }

  pub(crate) fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  /// Drop cached reads no view has used for `max_idle`.
  pub fn collect_garbage(&self, max_idle: chrono::Duration) -> usize {
    self.store.collect_garbage(max_idle)
  }

  /// Current state of `key` without starting any request.
  pub fn entry(&self, key: &CacheKey) -> CacheEntry {
    self.queries.current(key)
  }

  /// Read `key`, going to the content service only when the cache cannot
  /// answer.
  pub async fn load(&self, key: &CacheKey) -> Result<CacheResult<CacheValue>> {
    if let CacheKey::UserReactions(post_id, principal) = key {
      let reactions = self.mutations.user_reactions(*post_id, principal)?;
      let fetched_at = self.store.get(key).fetched_at;
      return Ok(CacheResult::from_cache(
        reactions.into_value(),
        fetched_at,
        false,
      ));
    }

    match self.connection() {
      Some(gateway) => {
        self
          .queries
          .read(key, || fetch(gateway, key.clone()))
          .await
      }
      None => self.queries.read_cached(key),
    }
  }

  /// Typed [`SyncClient::load`].
  pub async fn read<T: Cacheable>(&self, key: &CacheKey) -> Result<CacheResult<T>> {
    let result = self.load(key).await?;
    let data = T::from_value(&result.data).ok_or_else(|| SyncError::ValueMismatch {
      key: key.clone(),
    })?;
    Ok(result.map(|_| data))
  }

  /// Fetch `key` again even if it is fresh.
  pub async fn refetch(&self, key: &CacheKey) -> Result<CacheValue> {
    if key.is_local() {
      return Ok(self.load(key).await?.data);
    }
    let gateway = self.connected()?;
    self
      .queries
      .refetch(key, || fetch(gateway, key.clone()))
      .await
  }

  /// Wait for the background load of `key`, if one is running.
  pub async fn settle(&self, key: &CacheKey) -> Option<Result<CacheValue>> {
    self.queries.settle(key).await
  }

  /// Follow `key` from a view.
  pub fn subscribe<T: Cacheable>(&self, key: CacheKey) -> Subscription<T> {
    Subscription::new(self.clone(), key)
  }

  pub async fn post(&self, id: PostId) -> Result<Option<Post>> {
    Ok(self.read(&CacheKey::Post(id)).await?.data)
  }

  pub async fn posts(&self, query: PostQuery) -> Result<Vec<Post>> {
    Ok(self.read(&CacheKey::PostsByFilter(query)).await?.data)
  }

  pub async fn comments(&self, post_id: PostId) -> Result<Vec<Comment>> {
    Ok(self.read(&CacheKey::Comments(post_id)).await?.data)
  }

  pub async fn replies(&self, comment_id: CommentId) -> Result<Vec<Comment>> {
    Ok(self.read(&CacheKey::Replies(comment_id)).await?.data)
  }

  pub async fn reaction_count(&self, post_id: PostId, reaction: ReactionType) -> Result<u64> {
    Ok(
      self
        .read(&CacheKey::ReactionCount(post_id, reaction))
        .await?
        .data,
    )
  }

  /// Reactions the caller is locally known to have on `post_id`. Empty for
  /// an anonymous caller.
  pub fn user_reactions(&self, post_id: PostId) -> Result<ReactionSet> {
    match &self.principal {
      Some(principal) => self.mutations.user_reactions(post_id, principal),
      None => Ok(ReactionSet::new()),
    }
  }

  pub async fn profile(&self, principal: &Principal) -> Result<Option<UserProfile>> {
    Ok(
      self
        .read(&CacheKey::Profile(principal.clone()))
        .await?
        .data,
    )
  }

  pub async fn guidelines(&self) -> Result<String> {
    Ok(self.read(&CacheKey::Guidelines).await?.data)
  }

  /// Top-level comments of `post_id`, each with its replies.
  pub async fn thread(&self, post_id: PostId) -> Result<Vec<ThreadItem>> {
    let comments = self.comments(post_id).await?;
    Ok(assemble(self, post_id, &comments).await)
  }

  pub async fn create_post(&self, post: NewPost) -> Result<PostId> {
    let gateway = self.connected()?;
    self
      .mutations
      .run(Mutation::CreatePost, async move {
        gateway.create_post(&post).await
      })
      .await
  }

  pub async fn create_comment(
    &self,
    post_id: PostId,
    parent_comment_id: Option<CommentId>,
    body: String,
  ) -> Result<CommentId> {
    let gateway = self.connected()?;
    self
      .mutations
      .run(
        Mutation::CreateComment {
          post_id,
          parent_comment_id,
        },
        async move {
          gateway
            .create_comment(post_id, parent_comment_id, &body)
            .await
        },
      )
      .await
  }

  /// Toggle the caller's `reaction` on `post_id`.
  ///
  /// The new membership is in the cache by the time this returns; the
  /// returned future sends the request and confirms or rolls back.
  pub fn toggle_reaction(
    &self,
    post_id: PostId,
    reaction: ReactionType,
  ) -> BoxFuture<'static, Result<ReactionSet>> {
    let started = self.connected().and_then(|gateway| {
      let principal = self.principal.as_ref().ok_or(SyncError::Anonymous)?;
      let record = self.mutations.apply_toggle(post_id, principal, reaction)?;
      Ok((gateway, record))
    });
    let mutations = self.mutations.clone();

    async move {
      let (gateway, record) = started?;
      let outcome = if record.turns_on() {
        gateway.add_reaction(post_id, reaction).await
      } else {
        gateway.remove_reaction(post_id, reaction).await
      };
      mutations.settle_toggle(record, post_id, outcome)
    }
    .boxed()
  }

  pub async fn report_content(
    &self,
    content_id: u64,
    is_comment: bool,
    reason: ReportReason,
  ) -> Result<()> {
    let gateway = self.connected()?;
    self
      .mutations
      .run(Mutation::SubmitReport, async move {
        gateway
          .report_content(content_id, is_comment, reason)
          .await
      })
      .await
  }

  pub async fn save_profile(&self, profile: UserProfile) -> Result<()> {
    let gateway = self.connected()?;
    let mutation = Mutation::SaveProfile {
      principal: self.principal.clone(),
    };
    self
      .mutations
      .run(mutation, async move {
        gateway.save_caller_user_profile(&profile).await
      })
      .await
  }

  fn connection(&self) -> Option<Arc<dyn ContentGateway>> {
    self.gateway.read().clone()
  }

  fn connected(&self) -> Result<Arc<dyn ContentGateway>> {
    self.connection().ok_or(SyncError::Unavailable)
  }
}

#[async_trait]
impl ReplySource for SyncClient {
  async fn replies(&self, comment_id: CommentId) -> Result<Vec<Comment>> {
    SyncClient::replies(self, comment_id).await
  }
}

/// The content service request that produces the value for `key`.
fn fetch(gateway: Arc<dyn ContentGateway>, key: CacheKey) -> FetchFuture {
  async move {
    let value = match &key {
      CacheKey::Post(id) => gateway.get_post(*id).await?.into_value(),
      CacheKey::PostsByFilter(query) => {
        let posts = match (query.keyword(), query.post_type()) {
          (Some(keyword), _) => gateway.search_posts(keyword).await?,
          (None, Some(post_type)) => gateway.get_posts_by_type(Some(post_type)).await?,
          (None, None) => {
            gateway
              .get_all_posts_sorted(query.is_oldest_first())
              .await?
          }
        };
        posts.into_value()
      }
      CacheKey::Comments(post_id) => gateway.get_comments_by_post(*post_id).await?.into_value(),
      CacheKey::Replies(comment_id) => {
        gateway
          .get_replies_by_comment(*comment_id)
          .await?
          .into_value()
      }
      CacheKey::ReactionCount(post_id, reaction) => {
        gateway
          .count_post_reactions(*post_id, *reaction)
          .await?
          .into_value()
      }
      CacheKey::Profile(principal) => gateway.get_user_profile(principal).await?.into_value(),
      CacheKey::Guidelines => gateway.get_community_guidelines().await?.into_value(),
      CacheKey::UserReactions(..) => {
        return Err(GatewayError::new(format!(
          "{} is tracked locally and cannot be fetched",
          key
        )))
      }
    };
    Ok(value)
  }
  .boxed()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, CacheStatus};
  use crate::gateway::fake::{comment, post, FakeGateway};
  use crate::gateway::PostType;
  use futures::future::join_all;

  fn alice() -> Principal {
    Principal::new("alice")
  }

  fn connected(gateway: FakeGateway) -> (SyncClient, Arc<FakeGateway>) {
    let gateway = Arc::new(gateway);
    let client = SyncClient::new(&CacheConfig::default(), Some(alice()));
    client.connect(gateway.clone());
    (client, gateway)
  }

  fn seeded() -> FakeGateway {
    FakeGateway::new()
      .with_post(post(7, PostType::Question, "Sleep training?"))
      .with_post(post(8, PostType::Story, "First steps"))
      .with_comment(comment(1, 7, None))
      .with_comment(comment(2, 7, Some(1)))
      .with_comment(comment(3, 7, None))
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_call() {
    let (client, gateway) = connected(seeded());

    let results = join_all((0..8).map(|_| client.post(7))).await;

    assert_eq!(gateway.calls_to("get_post"), 1);
    for result in results {
      assert_eq!(result.unwrap().map(|p| p.id), Some(7));
    }
  }

  #[tokio::test]
  async fn test_fresh_read_is_synchronous_and_stale_refetches_once() {
    let (client, gateway) = connected(seeded());
    let key = CacheKey::Post(7);
    client.post(7).await.unwrap();

    let fresh = client
      .read::<Option<Post>>(&key)
      .now_or_never()
      .expect("fresh read must not wait")
      .unwrap();
    assert_eq!(fresh.source, CacheSource::CacheFresh);
    assert_eq!(gateway.calls_to("get_post"), 1);

    client.store().mark_stale(&key);
    let stale = client
      .read::<Option<Post>>(&key)
      .now_or_never()
      .expect("stale read must not wait")
      .unwrap();
    assert_eq!(stale.source, CacheSource::CacheStale);
    assert_eq!(stale.data, fresh.data);

    // Reading again during the refresh starts nothing new
    client.read::<Option<Post>>(&key).await.unwrap();
    client.settle(&key).await.unwrap().unwrap();
    assert_eq!(gateway.calls_to("get_post"), 2);
    assert_eq!(client.entry(&key).status, CacheStatus::Fresh);

    client.post(7).await.unwrap();
    assert_eq!(gateway.calls_to("get_post"), 2);
  }

  #[tokio::test]
  async fn test_double_toggle_restores_membership() {
    let (client, gateway) = connected(seeded());
    let before = client.user_reactions(7).unwrap();

    let first = client.toggle_reaction(7, ReactionType::Support);
    assert!(client
      .user_reactions(7)
      .unwrap()
      .contains(&ReactionType::Support));
    let second = client.toggle_reaction(7, ReactionType::Support);
    let (first, second) = futures::join!(first, second);

    first.unwrap();
    second.unwrap();
    assert_eq!(client.user_reactions(7).unwrap(), before);
    assert_eq!(
      gateway.calls(),
      vec!["add_reaction 7 support", "remove_reaction 7 support"]
    );
  }

  #[tokio::test]
  async fn test_toggle_after_garbage_collection_removes() {
    let (client, gateway) = connected(seeded());
    client
      .toggle_reaction(7, ReactionType::Support)
      .await
      .unwrap();

    client.collect_garbage(chrono::Duration::seconds(-1));
    assert!(client
      .user_reactions(7)
      .unwrap()
      .contains(&ReactionType::Support));

    client
      .toggle_reaction(7, ReactionType::Support)
      .await
      .unwrap();
    assert!(client.user_reactions(7).unwrap().is_empty());
    assert_eq!(
      gateway.calls(),
      vec!["add_reaction 7 support", "remove_reaction 7 support"]
    );
  }

  #[tokio::test]
  async fn test_rejected_add_rolls_back_to_snapshot() {
    let (client, gateway) = connected(seeded());
    client
      .toggle_reaction(7, ReactionType::Helpful)
      .await
      .unwrap();
    let before = client.user_reactions(7).unwrap();
    gateway.fail("add_reaction");

    let outcome = client.toggle_reaction(7, ReactionType::Support).await;

    assert!(matches!(
      outcome,
      Err(SyncError::Mutation {
        rolled_back: true,
        ..
      })
    ));
    assert_eq!(client.user_reactions(7).unwrap(), before);
  }

  #[tokio::test]
  async fn test_confirmed_toggle_refetches_count() {
    let (client, gateway) = connected(seeded());
    assert_eq!(
      client.reaction_count(7, ReactionType::Support).await.unwrap(),
      0
    );

    client
      .toggle_reaction(7, ReactionType::Support)
      .await
      .unwrap();
    let key = CacheKey::ReactionCount(7, ReactionType::Support);
    assert_eq!(client.entry(&key).status, CacheStatus::Stale);

    client.reaction_count(7, ReactionType::Support).await.unwrap();
    client.settle(&key).await.unwrap().unwrap();
    assert_eq!(
      client.reaction_count(7, ReactionType::Support).await.unwrap(),
      1
    );
    assert_eq!(gateway.calls_to("count_post_reactions"), 2);
  }

  #[tokio::test]
  async fn test_comment_invalidation_follows_parent() {
    let (client, _gateway) = connected(seeded());
    client.comments(7).await.unwrap();
    client.replies(1).await.unwrap();

    client
      .create_comment(7, None, "welcome".to_string())
      .await
      .unwrap();
    assert_eq!(client.entry(&CacheKey::Comments(7)).status, CacheStatus::Stale);
    assert_eq!(client.entry(&CacheKey::Replies(1)).status, CacheStatus::Fresh);

    client.refetch(&CacheKey::Comments(7)).await.unwrap();
    client
      .create_comment(7, Some(1), "same here".to_string())
      .await
      .unwrap();
    assert_eq!(client.entry(&CacheKey::Comments(7)).status, CacheStatus::Stale);
    assert_eq!(client.entry(&CacheKey::Replies(1)).status, CacheStatus::Stale);
  }

  #[tokio::test]
  async fn test_new_post_stales_every_list() {
    let (client, _gateway) = connected(seeded());
    let queries = [
      PostQuery::default(),
      PostQuery::new(Some(PostType::Story), ""),
      PostQuery::new(None, "sleep"),
    ];
    for query in &queries {
      client.posts(query.clone()).await.unwrap();
    }

    let id = client
      .create_post(NewPost {
        post_type: PostType::Story,
        title: "Night feeds".to_string(),
        body: "What worked".to_string(),
        tags: vec!["sleep".to_string()],
      })
      .await
      .unwrap();

    for query in &queries {
      let key = CacheKey::PostsByFilter(query.clone());
      assert_eq!(client.entry(&key).status, CacheStatus::Stale);
    }

    let key = CacheKey::PostsByFilter(PostQuery::default());
    client.posts(PostQuery::default()).await.unwrap();
    let refreshed = client.settle(&key).await.unwrap().unwrap();
    let posts = <Vec<Post>>::from_value(&refreshed).unwrap();
    assert!(posts.iter().any(|p| p.id == id));
  }

  #[tokio::test]
  async fn test_feed_query_dispatch() {
    let (client, gateway) = connected(seeded());

    client.posts(PostQuery::new(None, "  steps ")).await.unwrap();
    client
      .posts(PostQuery::new(Some(PostType::Question), ""))
      .await
      .unwrap();
    let oldest = client
      .posts(PostQuery::default().oldest_first(true))
      .await
      .unwrap();

    assert_eq!(gateway.calls_to("search_posts"), 1);
    assert_eq!(gateway.calls_to("get_posts_by_type"), 1);
    assert_eq!(gateway.calls_to("get_all_posts_sorted"), 1);
    assert_eq!(oldest.len(), 2);
  }

  #[tokio::test]
  async fn test_disconnected_client_serves_cache_and_rejects_writes() {
    let gateway = Arc::new(seeded());
    let client = SyncClient::new(&CacheConfig::default(), Some(alice()));

    assert!(matches!(client.post(7).await, Err(SyncError::Unavailable)));
    assert_eq!(client.entry(&CacheKey::Post(7)).status, CacheStatus::Empty);

    client.connect(gateway.clone());
    client.post(7).await.unwrap();
    client.disconnect();

    let cached = client.read::<Option<Post>>(&CacheKey::Post(7)).await.unwrap();
    assert_eq!(cached.source, CacheSource::Offline);

    let before = client.user_reactions(7).unwrap();
    let toggled = client.toggle_reaction(7, ReactionType::Support).await;
    assert!(matches!(toggled, Err(SyncError::Unavailable)));
    assert_eq!(client.user_reactions(7).unwrap(), before);
    assert!(matches!(
      client.report_content(7, false, ReportReason::Spam).await,
      Err(SyncError::Unavailable)
    ));
    assert_eq!(gateway.calls_to("report_content"), 0);
  }

  #[tokio::test]
  async fn test_anonymous_caller_cannot_react() {
    let client = SyncClient::new(&CacheConfig::default(), None);
    client.connect(Arc::new(seeded()));

    let outcome = client.toggle_reaction(7, ReactionType::Helpful).await;

    assert!(matches!(outcome, Err(SyncError::Anonymous)));
    assert!(client.user_reactions(7).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_failed_read_waits_for_caller_retry() {
    let (client, gateway) = connected(seeded());
    gateway.fail("get_comments_by_post");

    assert!(matches!(
      client.comments(7).await,
      Err(SyncError::Fetch { .. })
    ));
    assert_eq!(client.entry(&CacheKey::Comments(7)).status, CacheStatus::Error);
    assert_eq!(gateway.calls_to("get_comments_by_post"), 1);

    gateway.recover("get_comments_by_post");
    assert_eq!(client.comments(7).await.unwrap().len(), 3);
    assert_eq!(gateway.calls_to("get_comments_by_post"), 2);
  }

  #[tokio::test]
  async fn test_thread_partitions_and_fetches_replies() {
    let (client, gateway) = connected(seeded());

    let thread = client.thread(7).await.unwrap();

    let roots: Vec<_> = thread.iter().map(|item| item.comment.id).collect();
    assert_eq!(roots, vec![1, 3]);
    let replies: Vec<_> = thread[0]
      .replies
      .as_ref()
      .unwrap()
      .iter()
      .map(|c| c.id)
      .collect();
    assert_eq!(replies, vec![2]);
    assert!(client.entry(&CacheKey::Replies(1)).value.is_some());
    assert!(gateway.calls_to("get_replies_by_comment") >= 2);
  }

  #[tokio::test]
  async fn test_profile_save_stales_own_profile() {
    let (client, _gateway) = connected(seeded());
    assert_eq!(client.profile(&alice()).await.unwrap(), None);

    client
      .save_profile(UserProfile {
        name: "Alice".to_string(),
      })
      .await
      .unwrap();

    let key = CacheKey::Profile(alice());
    assert_eq!(client.entry(&key).status, CacheStatus::Stale);
    client.profile(&alice()).await.unwrap();
    let saved = client.settle(&key).await.unwrap().unwrap();
    assert_eq!(
      saved,
      CacheValue::Profile(Some(UserProfile {
        name: "Alice".to_string()
      }))
    );
  }
}
